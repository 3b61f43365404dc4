use serde_json::Value;

use crate::queue::JobEnvelope;
use crate::services::vocab_trainer::{AudioEvaluationJobPayload, FillInBlankJobPayload};

use super::{WorkerContext, WorkerError};

pub async fn fill_in_blank(ctx: &WorkerContext, job: &JobEnvelope) -> Result<Value, WorkerError> {
    let payload: FillInBlankJobPayload = job.decode()?;
    let outcome = ctx.trainers.evaluate_fill_in_blank_job(&payload).await?;
    Ok(serde_json::to_value(outcome)?)
}

pub async fn audio(ctx: &WorkerContext, job: &JobEnvelope) -> Result<Value, WorkerError> {
    let payload: AudioEvaluationJobPayload = job.decode()?;
    let outcome = ctx.trainers.evaluate_audio_job(&payload).await?;
    Ok(serde_json::to_value(outcome)?)
}
