use serde_json::{json, Value};

use crate::queue::JobEnvelope;
use crate::services::vocab::VocabTranslationJobPayload;

use super::{WorkerContext, WorkerError};

pub async fn translate(ctx: &WorkerContext, job: &JobEnvelope) -> Result<Value, WorkerError> {
    let payload: VocabTranslationJobPayload = job.decode()?;
    let vocab = ctx.vocabs.translate(&payload).await?;
    Ok(json!({ "vocabId": vocab.id, "textTargets": vocab.text_targets }))
}
