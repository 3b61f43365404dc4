use serde_json::{json, Value};
use tracing::info;

use crate::queue::JobEnvelope;
use crate::services::vocab_trainer::GenerationJobPayload;

use super::{WorkerContext, WorkerError};

pub async fn multiple_choice(ctx: &WorkerContext, job: &JobEnvelope) -> Result<Value, WorkerError> {
    let payload: GenerationJobPayload = job.decode()?;
    let generated = ctx.trainers.generate_multiple_choice(&payload).await?;
    info!(
        job_id = %job.id,
        trainer_id = %payload.vocab_trainer_id,
        generated,
        "Multiple choice questions generated"
    );
    Ok(json!({ "vocabTrainerId": payload.vocab_trainer_id, "questions": generated }))
}

pub async fn dialogue(ctx: &WorkerContext, job: &JobEnvelope) -> Result<Value, WorkerError> {
    let payload: GenerationJobPayload = job.decode()?;
    let turns = ctx.trainers.generate_dialogue(&payload).await?;
    info!(job_id = %job.id, trainer_id = %payload.vocab_trainer_id, turns, "Dialogue generated");
    Ok(json!({ "vocabTrainerId": payload.vocab_trainer_id, "turns": turns }))
}
