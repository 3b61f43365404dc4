use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use crate::queue::JobEnvelope;
use crate::services::notification::{ReminderDelivery, ReminderJobPayload};

use super::{WorkerContext, WorkerError};

pub async fn deliver(ctx: &WorkerContext, job: &JobEnvelope) -> Result<Value, WorkerError> {
    let payload: ReminderJobPayload = job.decode()?;
    let delivery = ctx
        .dispatcher
        .deliver_reminder(&payload.vocab_trainer_id, payload.remind_at)
        .await?;
    let outcome = match &delivery {
        ReminderDelivery::Delivered(_) => "delivered",
        ReminderDelivery::AlreadyDelivered => "already-delivered",
        ReminderDelivery::TrainerMissing => "trainer-missing",
        ReminderDelivery::Disabled => "disabled",
        ReminderDelivery::Rescheduled => "rescheduled",
    };
    debug!(job_id = %job.id, trainer_id = %payload.vocab_trainer_id, outcome, "Reminder job handled");
    Ok(json!({ "vocabTrainerId": payload.vocab_trainer_id, "outcome": outcome }))
}

/// Catches reminders whose delayed job was lost, e.g. across a restart of
/// the in-memory backend.
pub async fn sweep(ctx: &WorkerContext, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<usize, WorkerError> {
    Ok(ctx.dispatcher.sweep(since, until).await?)
}
