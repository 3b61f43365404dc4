use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::domain::{
    MasteryHistoryEntry, NewNotification, NewTrainer, NewTrainerResult, Notification, TextTarget,
    Trainer, TrainerResult, Vocab, VocabMastery,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("stale write on {entity} {id} (expected version {expected})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt {entity} row: {message}")]
    Decode { entity: &'static str, message: String },
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Persistence of the trainer aggregate. `find_by_id` returns the trainer
/// with its assigned vocabs (in assignment order) and current results.
#[async_trait]
pub trait TrainerRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Trainer>, RepositoryError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Trainer>, RepositoryError>;

    async fn create(&self, input: NewTrainer) -> Result<Trainer, RepositoryError>;

    /// Writes the scalar fields and `question_answers` if the stored version
    /// still equals `trainer.version`; returns the trainer with the bumped
    /// version, or [`RepositoryError::Conflict`].
    async fn update(&self, trainer: &Trainer) -> Result<Trainer, RepositoryError>;

    async fn set_vocabs(&self, trainer_id: &str, vocab_ids: &[String]) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    async fn create_results(
        &self,
        trainer_id: &str,
        results: &[NewTrainerResult],
    ) -> Result<Vec<TrainerResult>, RepositoryError>;

    async fn delete_results_by_trainer_id(&self, trainer_id: &str) -> Result<u64, RepositoryError>;

    /// Trainers with reminders enabled whose `reminder_last_remind` lies in
    /// `(since, until]`.
    async fn find_due_reminders(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Trainer>, RepositoryError>;
}

#[async_trait]
pub trait MasteryRepository: Send + Sync {
    async fn find_by_vocab_id_and_user_id(
        &self,
        vocab_id: &str,
        user_id: &str,
    ) -> Result<Option<VocabMastery>, RepositoryError>;

    /// Inserts `mastery`; if a row for the pair already exists the existing
    /// row is returned unchanged.
    async fn create(&self, mastery: &VocabMastery) -> Result<VocabMastery, RepositoryError>;

    /// Atomically applies one grading event (score ±1 clamped to 0..=10,
    /// counters, review time) to the row `id`.
    async fn apply_grade(
        &self,
        id: &str,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<VocabMastery, RepositoryError>;

    async fn append_history(&self, entry: &MasteryHistoryEntry) -> Result<(), RepositoryError>;

    async fn history(
        &self,
        vocab_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MasteryHistoryEntry>, RepositoryError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<VocabMastery>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, input: NewNotification) -> Result<Notification, RepositoryError>;

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, RepositoryError>;

    async fn reminder_exists(
        &self,
        trainer_id: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait VocabRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Vocab>, RepositoryError>;

    /// Returns the vocabs found, in the order of `ids`.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Vocab>, RepositoryError>;

    async fn create(&self, vocab: &Vocab) -> Result<Vocab, RepositoryError>;

    async fn update_text_targets(
        &self,
        id: &str,
        targets: &[TextTarget],
    ) -> Result<Vocab, RepositoryError>;
}

/// Canonical text form of a reminder timestamp, used as its dedupe key.
pub fn remind_key(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
