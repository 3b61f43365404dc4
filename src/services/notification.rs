use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::TrainerSettings;
use crate::core::{EventPublisher, NotificationPayload, TrainerEvent};
use crate::db::{remind_key, NotificationRepository, RepositoryError, TrainerRepository};
use crate::domain::{
    NewNotification, Notification, NotificationPriority, NotificationType, Trainer, TrainerStatus,
};
use crate::queue::{EnqueueOptions, JobQueue, TRAINER_REMINDER};

use super::error::ServiceError;

const SWEEP_BATCH: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderJobPayload {
    pub vocab_trainer_id: String,
    pub user_id: String,
    pub remind_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReminderDelivery {
    Delivered(Notification),
    AlreadyDelivered,
    TrainerMissing,
    Disabled,
    /// The trainer's reminder moved to another time since this one was queued.
    Rescheduled,
}

/// Creates notification records for grading outcomes and delivers scheduled
/// reminders. Every notification is persisted and then published.
pub struct ReminderDispatcher {
    trainers: Arc<dyn TrainerRepository>,
    notifications: Arc<dyn NotificationRepository>,
    queue: Arc<JobQueue>,
    events: EventPublisher,
    settings: TrainerSettings,
}

impl ReminderDispatcher {
    pub fn new(
        trainers: Arc<dyn TrainerRepository>,
        notifications: Arc<dyn NotificationRepository>,
        queue: Arc<JobQueue>,
        events: EventPublisher,
        settings: TrainerSettings,
    ) -> Self {
        Self {
            trainers,
            notifications,
            queue,
            events,
            settings,
        }
    }

    pub async fn notify(&self, input: NewNotification) -> Result<Notification, RepositoryError> {
        let notification = self.notifications.create(input).await?;
        self.events
            .publish(TrainerEvent::Notification(NotificationPayload {
                notification: notification.clone(),
            }))
            .await;
        Ok(notification)
    }

    /// The trainer reached its final repeat and was retired.
    pub async fn on_completed(&self, trainer: &Trainer) -> Result<Notification, RepositoryError> {
        info!(trainer_id = %trainer.id, user_id = %trainer.user_id, "Trainer completed");
        self.notify(NewNotification {
            user_id: trainer.user_id.clone(),
            notification_type: NotificationType::Achievement,
            title: "Trainer completed".to_string(),
            message: format!(
                "You passed \"{}\" {} times. These words are now part of your long-term vocabulary.",
                trainer.name, self.settings.max_repeat
            ),
            priority: NotificationPriority::High,
            data: json!({
                "vocabTrainerId": trainer.id,
                "trainerName": trainer.name,
                "reminderRepeat": self.settings.max_repeat,
            }),
        })
        .await
    }

    /// Outcome notification plus a delayed reminder job for `remind_at`.
    /// Returns the notification and the reminder job id.
    pub async fn on_outcome(
        &self,
        trainer: &Trainer,
        score: f64,
        remind_at: DateTime<Utc>,
    ) -> Result<(Notification, String), ServiceError> {
        let delay = (remind_at - Utc::now()).to_std().unwrap_or_default();
        let job_id = self
            .queue
            .enqueue(
                TRAINER_REMINDER,
                "trainer-reminder",
                &ReminderJobPayload {
                    vocab_trainer_id: trainer.id.clone(),
                    user_id: trainer.user_id.clone(),
                    remind_at,
                },
                EnqueueOptions::delayed(delay),
            )
            .await?;
        debug!(trainer_id = %trainer.id, job_id = %job_id, remind_at = %remind_key(remind_at), "Reminder scheduled");

        let (title, message) = match trainer.status {
            TrainerStatus::Passed => (
                "Trainer passed".to_string(),
                format!(
                    "You scored {:.0}% on \"{}\" ({}/{}). We'll remind you to review on {}.",
                    score,
                    trainer.name,
                    trainer.reminder_repeat,
                    self.settings.max_repeat,
                    remind_at.format("%Y-%m-%d"),
                ),
            ),
            _ => (
                "Keep practicing".to_string(),
                format!(
                    "You scored {:.0}% on \"{}\". Try again when you're ready.",
                    score, trainer.name
                ),
            ),
        };

        let notification = self
            .notify(NewNotification {
                user_id: trainer.user_id.clone(),
                notification_type: NotificationType::Learning,
                title,
                message,
                priority: NotificationPriority::Normal,
                data: json!({
                    "vocabTrainerId": trainer.id,
                    "status": trainer.status.as_str(),
                    "score": score,
                    "reminderRepeat": trainer.reminder_repeat,
                    "remindAt": remind_key(remind_at),
                }),
            })
            .await?;

        Ok((notification, job_id))
    }

    /// Idempotent per (trainer, remind_at). Used by the reminder job and the
    /// periodic sweep alike.
    pub async fn deliver_reminder(
        &self,
        trainer_id: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<ReminderDelivery, RepositoryError> {
        let Some(trainer) = self.trainers.find_by_id(trainer_id).await? else {
            debug!(trainer_id, "Reminder skipped, trainer gone");
            return Ok(ReminderDelivery::TrainerMissing);
        };
        if trainer.reminder_disabled {
            return Ok(ReminderDelivery::Disabled);
        }
        if trainer.reminder_last_remind.map(remind_key) != Some(remind_key(remind_at)) {
            return Ok(ReminderDelivery::Rescheduled);
        }
        if self.notifications.reminder_exists(trainer_id, remind_at).await? {
            return Ok(ReminderDelivery::AlreadyDelivered);
        }

        let notification = self
            .notify(NewNotification {
                user_id: trainer.user_id.clone(),
                notification_type: NotificationType::Reminder,
                title: "Time to review".to_string(),
                message: format!("\"{}\" is ready for another round.", trainer.name),
                priority: NotificationPriority::Normal,
                data: json!({
                    "vocabTrainerId": trainer.id,
                    "remindAt": remind_key(remind_at),
                    "reminderRepeat": trainer.reminder_repeat,
                }),
            })
            .await?;
        info!(trainer_id, user_id = %trainer.user_id, "Reminder delivered");
        Ok(ReminderDelivery::Delivered(notification))
    }

    /// Delivers every reminder due in `(since, until]`. Returns how many
    /// notifications were created.
    pub async fn sweep(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let due = self.trainers.find_due_reminders(since, until, SWEEP_BATCH).await?;
        let mut delivered = 0usize;
        for trainer in &due {
            let Some(remind_at) = trainer.reminder_last_remind else {
                continue;
            };
            match self.deliver_reminder(&trainer.id, remind_at).await {
                Ok(ReminderDelivery::Delivered(_)) => delivered += 1,
                Ok(_) => {}
                Err(e) => warn!(trainer_id = %trainer.id, error = %e, "Reminder sweep delivery failed"),
            }
        }
        if delivered > 0 {
            info!(scanned = due.len(), delivered, "Reminder sweep completed");
        }
        Ok(delivered)
    }

    pub async fn list(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, RepositoryError> {
        self.notifications.list_by_user(user_id, limit.clamp(1, 200)).await
    }

    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool, RepositoryError> {
        self.notifications.mark_read(id, user_id).await
    }
}
