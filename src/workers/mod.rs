mod evaluation;
mod generation;
mod reminder;
mod vocab_translation;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::config::WorkerSettings;
use crate::core::{EventPublisher, JobProgressPayload, TrainerEvent};
use crate::db::RepositoryError;
use crate::queue::{
    FailureOutcome, JobEnvelope, JobQueue, QueueError, ALL_QUEUES, AUDIO_EVALUATION,
    DIALOGUE_GENERATION, FILL_IN_BLANK_EVALUATION, MULTIPLE_CHOICE_GENERATION, TRAINER_REMINDER,
    VOCAB_TRANSLATION,
};
use crate::services::notification::ReminderDispatcher;
use crate::services::vocab::VocabService;
use crate::services::vocab_trainer::TrainerService;
use crate::services::ServiceError;

/// How far back the first reminder sweep after startup looks.
const INITIAL_SWEEP_LOOKBACK_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("No handler for queue {0}")]
    UnknownQueue(String),
}

impl WorkerError {
    /// Failures that another attempt cannot fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Payload(_) | Self::UnknownQueue(_) => true,
            Self::Service(ServiceError::NotFound(_) | ServiceError::Validation(_)) => true,
            Self::Service(ServiceError::Completion(e)) => !e.is_retryable(),
            _ => false,
        }
    }
}

/// Everything the queue handlers need.
pub struct WorkerContext {
    pub trainers: Arc<TrainerService>,
    pub vocabs: Arc<VocabService>,
    pub dispatcher: Arc<ReminderDispatcher>,
    pub queue: Arc<JobQueue>,
    pub events: EventPublisher,
}

/// What happened to one job taken off a queue.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Retrying { attempt: u32 },
    DeadLettered(String),
}

pub struct WorkerManager {
    ctx: Arc<WorkerContext>,
    settings: WorkerSettings,
    scheduler: Mutex<Option<JobScheduler>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerManager {
    pub fn new(ctx: Arc<WorkerContext>, settings: WorkerSettings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ctx,
            settings,
            scheduler: Mutex::new(None),
            consumers: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        if !self.settings.enabled {
            info!("WORKER_ENABLED is false, skipping worker startup");
            return Ok(());
        }

        let mut consumers = self.consumers.lock().await;
        for queue in ALL_QUEUES {
            for slot in 0..self.settings.concurrency {
                let ctx = Arc::clone(&self.ctx);
                let shutdown_rx = self.shutdown_tx.subscribe();
                let poll_interval = self.settings.poll_interval;
                consumers.push(tokio::spawn(consume(ctx, queue, slot, poll_interval, shutdown_rx)));
            }
        }
        info!(
            queues = ALL_QUEUES.len(),
            concurrency = self.settings.concurrency,
            "Queue consumers started"
        );
        drop(consumers);

        let scheduler = JobScheduler::new().await?;
        let schedule = self.settings.reminder_sweep_schedule.clone();
        let ctx = Arc::clone(&self.ctx);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let last_sweep = Arc::new(parking_lot::Mutex::new(
            Utc::now() - chrono::Duration::hours(INITIAL_SWEEP_LOOKBACK_HOURS),
        ));
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let ctx = Arc::clone(&ctx);
            let last_sweep = Arc::clone(&last_sweep);
            let mut rx = shutdown_rx.resubscribe();
            Box::pin(async move {
                let until = Utc::now();
                let since = *last_sweep.lock();
                tokio::select! {
                    _ = rx.recv() => {},
                    result = reminder::sweep(&ctx, since, until) => {
                        match result {
                            Ok(_) => *last_sweep.lock() = until,
                            Err(e) => error!(error = %e, "Reminder sweep error"),
                        }
                    }
                }
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;
        *self.scheduler.lock().await = Some(scheduler);
        info!(schedule = %schedule, "Reminder sweep scheduled");

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        for handle in self.consumers.lock().await.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Queue consumer ended abnormally");
            }
        }
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "Error shutting down scheduler");
            }
        }
        info!("Workers stopped");
    }

    /// Processes ready jobs on every queue until all are empty. Returns the
    /// number of jobs handled. Delayed jobs that are not yet due are left.
    pub async fn run_until_idle(&self) -> Result<usize, WorkerError> {
        let mut handled = 0usize;
        loop {
            let mut progressed = false;
            for queue in ALL_QUEUES {
                if let Some(job) = self.ctx.queue.next_job(queue, Duration::ZERO).await? {
                    process_job(&self.ctx, job).await?;
                    handled += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(handled);
            }
        }
    }

    pub async fn sweep_reminders(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<usize, WorkerError> {
        reminder::sweep(&self.ctx, since, until).await
    }
}

async fn consume(
    ctx: Arc<WorkerContext>,
    queue: &'static str,
    slot: usize,
    poll_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!(queue, slot, "Queue consumer started");
    loop {
        let next = tokio::select! {
            _ = shutdown_rx.recv() => break,
            next = ctx.queue.next_job(queue, poll_interval) => next,
        };
        match next {
            Ok(Some(job)) => {
                if let Err(e) = process_job(&ctx, job).await {
                    error!(queue, error = %e, "Job bookkeeping failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(queue, error = %e, "Queue poll failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
    debug!(queue, slot, "Queue consumer stopped");
}

/// Runs one job: publishes progress, dispatches to the queue's handler and
/// reports the result back to the queue.
pub async fn process_job(ctx: &WorkerContext, mut job: JobEnvelope) -> Result<JobOutcome, WorkerError> {
    let started = progress_event(&job, None, None);
    match job.queue.as_str() {
        MULTIPLE_CHOICE_GENERATION | DIALOGUE_GENERATION => {
            ctx.events.publish(TrainerEvent::Generating(started)).await;
        }
        FILL_IN_BLANK_EVALUATION | AUDIO_EVALUATION => {
            ctx.events.publish(TrainerEvent::Evaluating(started)).await;
        }
        _ => {}
    }

    let result = match job.queue.as_str() {
        MULTIPLE_CHOICE_GENERATION => generation::multiple_choice(ctx, &job).await,
        DIALOGUE_GENERATION => generation::dialogue(ctx, &job).await,
        FILL_IN_BLANK_EVALUATION => evaluation::fill_in_blank(ctx, &job).await,
        AUDIO_EVALUATION => evaluation::audio(ctx, &job).await,
        VOCAB_TRANSLATION => vocab_translation::translate(ctx, &job).await,
        TRAINER_REMINDER => reminder::deliver(ctx, &job).await,
        other => Err(WorkerError::UnknownQueue(other.to_string())),
    };

    match result {
        Ok(value) => {
            ctx.queue.complete(&job, Some(value.clone())).await?;
            ctx.events
                .publish(TrainerEvent::Completed(progress_event(&job, Some(value.clone()), None)))
                .await;
            debug!(job_id = %job.id, queue = %job.queue, "Job completed");
            Ok(JobOutcome::Completed(value))
        }
        Err(err) => {
            let message = err.to_string();
            error!(
                job_id = %job.id,
                queue = %job.queue,
                entity_id = job.entity_id().unwrap_or("-"),
                attempt = job.attempts_made,
                permanent = err.is_permanent(),
                error = %message,
                "Job failed"
            );
            ctx.events
                .publish(TrainerEvent::Failed(progress_event(&job, None, Some(message.clone()))))
                .await;
            if err.is_permanent() {
                job.attempts_made = job.max_attempts;
            }
            match ctx.queue.fail(job, &message).await? {
                FailureOutcome::Retrying { attempt, delay } => {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Job re-queued");
                    Ok(JobOutcome::Retrying { attempt })
                }
                FailureOutcome::DeadLettered => Ok(JobOutcome::DeadLettered(message)),
            }
        }
    }
}

fn progress_event(job: &JobEnvelope, payload: Option<Value>, error: Option<String>) -> JobProgressPayload {
    JobProgressPayload {
        job_id: job.id.clone(),
        user_id: job.user_id().unwrap_or_default().to_string(),
        queue: job.queue.clone(),
        vocab_trainer_id: job
            .payload
            .get("vocabTrainerId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        payload,
        error,
        timestamp: Utc::now(),
    }
}
