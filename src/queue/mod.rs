pub mod memory;
pub mod redis_backend;
pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, info, warn};

pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use tracker::{JobRecord, JobState};

pub const MULTIPLE_CHOICE_GENERATION: &str = "multiple-choice-generation";
pub const DIALOGUE_GENERATION: &str = "dialogue-generation";
pub const FILL_IN_BLANK_EVALUATION: &str = "fill-in-blank-evaluation";
pub const AUDIO_EVALUATION: &str = "audio-evaluation";
pub const VOCAB_TRANSLATION: &str = "vocab-translation";
pub const TRAINER_REMINDER: &str = "trainer-reminder";

pub const ALL_QUEUES: [&str; 6] = [
    MULTIPLE_CHOICE_GENERATION,
    DIALOGUE_GENERATION,
    FILL_IN_BLANK_EVALUATION,
    AUDIO_EVALUATION,
    VOCAB_TRANSLATION,
    TRAINER_REMINDER,
];

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
    #[error("queue {0} is closed")]
    Closed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub id: String,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Key of the live-job claim this job holds, released when it ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,
}

impl JobEnvelope {
    pub fn new(queue: &str, name: &str, payload: serde_json::Value, max_attempts: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            name: name.to_string(),
            payload,
            attempts_made: 0,
            max_attempts: max_attempts.max(1),
            enqueued_at: Utc::now(),
            last_error: None,
            unique_key: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.payload.get("userId").and_then(|v| v.as_str())
    }

    /// The trainer or vocab this job works on.
    pub fn entity_id(&self) -> Option<&str> {
        self.payload
            .get("vocabTrainerId")
            .or_else(|| self.payload.get("vocabId"))
            .and_then(|v| v.as_str())
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
    /// Six-field cron pattern; the payload is re-enqueued on every tick.
    pub cron: Option<String>,
    pub attempts: Option<u32>,
    /// When set, at most one non-terminal job per (queue, key) exists; a
    /// second enqueue returns the live job's id.
    pub unique_key: Option<String>,
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn unique(key: impl Into<String>) -> Self {
        Self {
            unique_key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// Storage and transport of jobs. Implementations must be safe for many
/// concurrent consumers of the same queue.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn push(&self, job: JobEnvelope, delay: Option<Duration>) -> Result<(), QueueError>;

    /// Next ready job, waiting up to `wait`.
    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<JobEnvelope>, QueueError>;

    async fn dead_letter(&self, job: JobEnvelope) -> Result<(), QueueError>;

    async fn dead_letters(&self, queue: &str) -> Result<Vec<JobEnvelope>, QueueError>;

    async fn put_record(&self, record: &JobRecord) -> Result<(), QueueError>;

    async fn get_record(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError>;

    /// Registers `job_id` as the live job for `(queue, key)`. Returns the id
    /// of an already-live job instead, if any.
    async fn claim_active(&self, queue: &str, key: &str, job_id: &str) -> Result<Option<String>, QueueError>;

    async fn release_active(&self, queue: &str, key: &str, job_id: &str) -> Result<(), QueueError>;
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub default_attempts: u32,
    pub backoff_base: Duration,
}

impl QueueSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_attempts: crate::config::env_parse("QUEUE_DEFAULT_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.default_attempts),
            backoff_base: crate::config::env_parse::<u64>("QUEUE_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// What [`JobQueue::fail`] did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { attempt: u32, delay: Duration },
    DeadLettered,
}

pub struct JobQueue {
    backend: Arc<dyn JobBackend>,
    settings: QueueSettings,
    scheduler: Mutex<Option<JobScheduler>>,
}

impl JobQueue {
    pub fn new(backend: Arc<dyn JobBackend>, settings: QueueSettings) -> Self {
        Self {
            backend,
            settings,
            scheduler: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), QueueSettings::default())
    }

    pub async fn enqueue<P: Serialize>(
        &self,
        queue: &str,
        name: &str,
        payload: &P,
        options: EnqueueOptions,
    ) -> Result<String, QueueError> {
        let payload = serde_json::to_value(payload)?;
        let attempts = options.attempts.unwrap_or(self.settings.default_attempts);

        if let Some(pattern) = options.cron.as_deref() {
            return self.schedule_cron(queue, name, payload, attempts, pattern).await;
        }

        let mut job = JobEnvelope::new(queue, name, payload, attempts);
        job.unique_key = options.unique_key.clone();

        if let Some(key) = options.unique_key.as_deref() {
            if let Some(existing) = self.backend.claim_active(queue, key, &job.id).await? {
                debug!(queue, key, job_id = %existing, "Live job found, not enqueueing duplicate");
                return Ok(existing);
            }
        }

        self.backend.put_record(&JobRecord::queued(&job)).await?;
        let job_id = job.id.clone();
        self.backend.push(job, options.delay).await?;
        debug!(queue, name, job_id = %job_id, delay_ms = ?options.delay.map(|d| d.as_millis()), "Job enqueued");
        Ok(job_id)
    }

    async fn schedule_cron(
        &self,
        queue: &str,
        name: &str,
        payload: serde_json::Value,
        attempts: u32,
        pattern: &str,
    ) -> Result<String, QueueError> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_none() {
            let scheduler = JobScheduler::new().await?;
            scheduler.start().await?;
            *guard = Some(scheduler);
        }
        let Some(scheduler) = guard.as_ref() else {
            return Err(QueueError::Closed(queue.to_string()));
        };

        let backend = Arc::clone(&self.backend);
        let (queue_name, job_name) = (queue.to_string(), name.to_string());
        let cron = Job::new_async(pattern, move |_uuid, _lock| {
            let backend = Arc::clone(&backend);
            let job = JobEnvelope::new(&queue_name, &job_name, payload.clone(), attempts);
            Box::pin(async move {
                let pushed = async {
                    backend.put_record(&JobRecord::queued(&job)).await?;
                    backend.push(job, None).await
                };
                if let Err(e) = pushed.await {
                    warn!(error = %e, "Cron enqueue failed");
                }
            })
        })?;
        let schedule_id = scheduler.add(cron).await?;
        info!(queue, name, pattern, "Repeatable job scheduled");
        Ok(schedule_id.to_string())
    }

    /// Next job for `queue`, marked processing with its attempt counted.
    pub async fn next_job(&self, queue: &str, wait: Duration) -> Result<Option<JobEnvelope>, QueueError> {
        let Some(mut job) = self.backend.pop(queue, wait).await? else {
            return Ok(None);
        };
        job.attempts_made += 1;
        self.update_record(&job, JobState::Processing, |_| {}).await?;
        Ok(Some(job))
    }

    pub async fn complete(&self, job: &JobEnvelope, result: Option<serde_json::Value>) -> Result<(), QueueError> {
        self.update_record(job, JobState::Completed, |record| {
            record.result = result;
            record.error = None;
        })
        .await?;
        self.release(job).await
    }

    /// Re-queues `job` with linear backoff while attempts remain, otherwise
    /// parks it in the dead-letter list.
    pub async fn fail(&self, mut job: JobEnvelope, error: &str) -> Result<FailureOutcome, QueueError> {
        job.last_error = Some(error.to_string());
        if job.attempts_made < job.max_attempts {
            let delay = self.settings.backoff_base * job.attempts_made;
            self.update_record(&job, JobState::Queued, |record| {
                record.error = Some(error.to_string());
            })
            .await?;
            let attempt = job.attempts_made;
            self.backend.push(job, Some(delay)).await?;
            return Ok(FailureOutcome::Retrying { attempt, delay });
        }

        self.update_record(&job, JobState::Failed, |record| {
            record.error = Some(error.to_string());
        })
        .await?;
        self.release(&job).await?;
        self.backend.dead_letter(job).await?;
        Ok(FailureOutcome::DeadLettered)
    }

    pub async fn status(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        self.backend.get_record(job_id).await
    }

    pub async fn dead_letters(&self, queue: &str) -> Result<Vec<JobEnvelope>, QueueError> {
        self.backend.dead_letters(queue).await
    }

    pub async fn shutdown(&self) {
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "Error shutting down queue scheduler");
            }
        }
    }

    async fn release(&self, job: &JobEnvelope) -> Result<(), QueueError> {
        match job.unique_key.as_deref() {
            Some(key) => self.backend.release_active(&job.queue, key, &job.id).await,
            None => Ok(()),
        }
    }

    async fn update_record<F>(&self, job: &JobEnvelope, state: JobState, apply: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut record = self
            .backend
            .get_record(&job.id)
            .await?
            .unwrap_or_else(|| JobRecord::queued(job));
        record.transition(state, job.attempts_made);
        apply(&mut record);
        self.backend.put_record(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> JobQueue {
        JobQueue::new(
            Arc::new(MemoryBackend::new()),
            QueueSettings {
                default_attempts: 2,
                backoff_base: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn enqueue_then_process_tracks_progress() {
        let queue = queue();
        let id = queue
            .enqueue(
                VOCAB_TRANSLATION,
                "translate",
                &json!({ "vocabId": "v1", "userId": "u1" }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(queue.status(&id).await.unwrap().unwrap().state, JobState::Queued);

        let job = queue
            .next_job(VOCAB_TRANSLATION, Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempts_made, 1);
        assert_eq!(queue.status(&id).await.unwrap().unwrap().state, JobState::Processing);

        queue.complete(&job, Some(json!({ "ok": true }))).await.unwrap();
        let record = queue.status(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn failures_retry_then_dead_letter() {
        let queue = queue();
        queue
            .enqueue(AUDIO_EVALUATION, "evaluate", &json!({ "vocabTrainerId": "t1" }), EnqueueOptions::default())
            .await
            .unwrap();

        let job = queue.next_job(AUDIO_EVALUATION, Duration::from_millis(50)).await.unwrap().unwrap();
        let outcome = queue.fail(job, "boom").await.unwrap();
        assert!(matches!(outcome, FailureOutcome::Retrying { attempt: 1, .. }));

        let job = queue.next_job(AUDIO_EVALUATION, Duration::from_millis(200)).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 2);
        assert_eq!(queue.fail(job.clone(), "boom again").await.unwrap(), FailureOutcome::DeadLettered);

        let dead = queue.dead_letters(AUDIO_EVALUATION).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("boom again"));
        assert_eq!(queue.status(&job.id).await.unwrap().unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn unique_key_returns_live_job() {
        let queue = queue();
        let payload = json!({ "vocabTrainerId": "t1", "userId": "u1" });
        let first = queue
            .enqueue(MULTIPLE_CHOICE_GENERATION, "generate", &payload, EnqueueOptions::unique("t1"))
            .await
            .unwrap();
        let second = queue
            .enqueue(MULTIPLE_CHOICE_GENERATION, "generate", &payload, EnqueueOptions::unique("t1"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let job = queue
            .next_job(MULTIPLE_CHOICE_GENERATION, Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        queue.complete(&job, None).await.unwrap();

        let third = queue
            .enqueue(MULTIPLE_CHOICE_GENERATION, "generate", &payload, EnqueueOptions::unique("t1"))
            .await
            .unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn claims_are_per_key_and_released_by_their_own_job() {
        let queue = queue();
        let payload = json!({ "vocabTrainerId": "t1", "userId": "u1" });
        let stale = queue
            .enqueue(DIALOGUE_GENERATION, "generate", &payload, EnqueueOptions::unique("t1:0"))
            .await
            .unwrap();
        let fresh = queue
            .enqueue(DIALOGUE_GENERATION, "generate", &payload, EnqueueOptions::unique("t1:1"))
            .await
            .unwrap();
        assert_ne!(stale, fresh);

        let job = queue.next_job(DIALOGUE_GENERATION, Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(job.id, stale);
        assert_eq!(job.unique_key.as_deref(), Some("t1:0"));
        queue.complete(&job, None).await.unwrap();

        let again = queue
            .enqueue(DIALOGUE_GENERATION, "generate", &payload, EnqueueOptions::unique("t1:1"))
            .await
            .unwrap();
        assert_eq!(again, fresh);
    }

    #[tokio::test]
    async fn delayed_job_is_not_ready_early() {
        let queue = queue();
        queue
            .enqueue(
                TRAINER_REMINDER,
                "remind",
                &json!({ "vocabTrainerId": "t1" }),
                EnqueueOptions::delayed(Duration::from_millis(300)),
            )
            .await
            .unwrap();
        assert!(queue.next_job(TRAINER_REMINDER, Duration::from_millis(20)).await.unwrap().is_none());
        assert!(queue.next_job(TRAINER_REMINDER, Duration::from_secs(2)).await.unwrap().is_some());
    }
}
