use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    MasteryHistoryEntry, NewNotification, NewTrainer, NewTrainerResult, Notification,
    NotificationType, QuestionAnswers, TextTarget, Trainer, TrainerResult, TrainerStatus, Vocab,
    VocabMastery,
};

use super::repository::{
    remind_key, MasteryRepository, NotificationRepository, RepositoryError, TrainerRepository,
    VocabRepository,
};

#[derive(Debug, Clone)]
struct StoredTrainer {
    trainer: Trainer,
    vocab_ids: Vec<String>,
}

/// Process-local implementation of every repository trait. Backs DB-less
/// runs and the test suites.
#[derive(Debug, Default)]
pub struct MemoryStore {
    vocabs: RwLock<HashMap<String, Vocab>>,
    trainers: RwLock<HashMap<String, StoredTrainer>>,
    results: RwLock<HashMap<String, Vec<TrainerResult>>>,
    masteries: RwLock<HashMap<String, VocabMastery>>,
    history: RwLock<Vec<MasteryHistoryEntry>>,
    notifications: RwLock<Vec<Notification>>,
    fail_history_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `append_history` fail, to exercise best-effort history writes.
    pub fn set_fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    fn assemble(&self, stored: &StoredTrainer) -> Trainer {
        let vocabs = self.vocabs.read();
        let mut trainer = stored.trainer.clone();
        trainer.vocabs = stored
            .vocab_ids
            .iter()
            .filter_map(|id| vocabs.get(id).cloned())
            .collect();
        trainer.results = self
            .results
            .read()
            .get(&trainer.id)
            .cloned()
            .unwrap_or_default();
        trainer
    }
}

#[async_trait]
impl TrainerRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Trainer>, RepositoryError> {
        let stored = self.trainers.read().get(id).cloned();
        Ok(stored.map(|s| self.assemble(&s)))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Trainer>, RepositoryError> {
        let stored: Vec<StoredTrainer> = self
            .trainers
            .read()
            .values()
            .filter(|s| s.trainer.user_id == user_id)
            .cloned()
            .collect();
        let mut trainers: Vec<Trainer> = stored.iter().map(|s| self.assemble(s)).collect();
        trainers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trainers)
    }

    async fn create(&self, input: NewTrainer) -> Result<Trainer, RepositoryError> {
        let now = Utc::now();
        let trainer = Trainer {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: input.user_id,
            name: input.name,
            question_type: input.question_type,
            status: TrainerStatus::Pending,
            question_answers: QuestionAnswers::empty(input.question_type),
            count_time: 0,
            set_count_time: input.set_count_time,
            reminder_repeat: 0,
            reminder_last_remind: None,
            reminder_disabled: false,
            vocabs: Vec::new(),
            results: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let stored = StoredTrainer {
            trainer: trainer.clone(),
            vocab_ids: input.vocab_ids,
        };
        self.trainers.write().insert(trainer.id.clone(), stored.clone());
        Ok(self.assemble(&stored))
    }

    async fn update(&self, trainer: &Trainer) -> Result<Trainer, RepositoryError> {
        let stored = {
            let mut trainers = self.trainers.write();
            let stored = trainers
                .get_mut(&trainer.id)
                .ok_or_else(|| RepositoryError::not_found("trainer", &trainer.id))?;
            if stored.trainer.version != trainer.version {
                return Err(RepositoryError::Conflict {
                    entity: "trainer",
                    id: trainer.id.clone(),
                    expected: trainer.version,
                });
            }
            let current = &mut stored.trainer;
            current.name = trainer.name.clone();
            current.status = trainer.status;
            current.question_answers = trainer.question_answers.clone();
            current.count_time = trainer.count_time;
            current.set_count_time = trainer.set_count_time;
            current.reminder_repeat = trainer.reminder_repeat;
            current.reminder_last_remind = trainer.reminder_last_remind;
            current.reminder_disabled = trainer.reminder_disabled;
            current.version += 1;
            current.updated_at = Utc::now();
            stored.clone()
        };
        Ok(self.assemble(&stored))
    }

    async fn set_vocabs(&self, trainer_id: &str, vocab_ids: &[String]) -> Result<(), RepositoryError> {
        let mut trainers = self.trainers.write();
        let stored = trainers
            .get_mut(trainer_id)
            .ok_or_else(|| RepositoryError::not_found("trainer", trainer_id))?;
        stored.vocab_ids = vocab_ids.to_vec();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let removed = self.trainers.write().remove(id).is_some();
        self.results.write().remove(id);
        Ok(removed)
    }

    async fn create_results(
        &self,
        trainer_id: &str,
        results: &[NewTrainerResult],
    ) -> Result<Vec<TrainerResult>, RepositoryError> {
        if !self.trainers.read().contains_key(trainer_id) {
            return Err(RepositoryError::not_found("trainer", trainer_id));
        }
        let now = Utc::now();
        let created: Vec<TrainerResult> = results
            .iter()
            .map(|r| TrainerResult {
                id: uuid::Uuid::new_v4().to_string(),
                trainer_id: trainer_id.to_string(),
                vocab_id: r.vocab_id.clone(),
                status: r.status,
                user_selected: r.user_selected.clone(),
                system_selected: r.system_selected.clone(),
                data: r.data.clone(),
                created_at: now,
            })
            .collect();
        self.results
            .write()
            .entry(trainer_id.to_string())
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn delete_results_by_trainer_id(&self, trainer_id: &str) -> Result<u64, RepositoryError> {
        Ok(self
            .results
            .write()
            .remove(trainer_id)
            .map(|r| r.len() as u64)
            .unwrap_or(0))
    }

    async fn find_due_reminders(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Trainer>, RepositoryError> {
        let stored: Vec<StoredTrainer> = self
            .trainers
            .read()
            .values()
            .filter(|s| {
                !s.trainer.reminder_disabled
                    && s
                        .trainer
                        .reminder_last_remind
                        .is_some_and(|at| at > since && at <= until)
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(stored.iter().map(|s| self.assemble(s)).collect())
    }
}

#[async_trait]
impl MasteryRepository for MemoryStore {
    async fn find_by_vocab_id_and_user_id(
        &self,
        vocab_id: &str,
        user_id: &str,
    ) -> Result<Option<VocabMastery>, RepositoryError> {
        Ok(self
            .masteries
            .read()
            .values()
            .find(|m| m.vocab_id == vocab_id && m.user_id == user_id)
            .cloned())
    }

    async fn create(&self, mastery: &VocabMastery) -> Result<VocabMastery, RepositoryError> {
        let mut masteries = self.masteries.write();
        if let Some(existing) = masteries
            .values()
            .find(|m| m.vocab_id == mastery.vocab_id && m.user_id == mastery.user_id)
        {
            return Ok(existing.clone());
        }
        masteries.insert(mastery.id.clone(), mastery.clone());
        Ok(mastery.clone())
    }

    async fn apply_grade(
        &self,
        id: &str,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<VocabMastery, RepositoryError> {
        let mut masteries = self.masteries.write();
        let mastery = masteries
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("vocab mastery", id))?;
        mastery.record(is_correct, at);
        Ok(mastery.clone())
    }

    async fn append_history(&self, entry: &MasteryHistoryEntry) -> Result<(), RepositoryError> {
        if self.fail_history_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Decode {
                entity: "vocab mastery history",
                message: "history writes disabled".to_string(),
            });
        }
        self.history.write().push(entry.clone());
        Ok(())
    }

    async fn history(
        &self,
        vocab_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MasteryHistoryEntry>, RepositoryError> {
        let mut entries: Vec<MasteryHistoryEntry> = self
            .history
            .read()
            .iter()
            .filter(|h| h.vocab_id == vocab_id && h.user_id == user_id)
            .cloned()
            .collect();
        entries.reverse();
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<VocabMastery>, RepositoryError> {
        Ok(self
            .masteries
            .read()
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create(&self, input: NewNotification) -> Result<Notification, RepositoryError> {
        let notification = Notification::from_new(input);
        self.notifications.write().push(notification.clone());
        Ok(notification)
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, RepositoryError> {
        let mut items: Vec<Notification> = self
            .notifications
            .read()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        items.reverse();
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn reminder_exists(
        &self,
        trainer_id: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let key = remind_key(remind_at);
        Ok(self.notifications.read().iter().any(|n| {
            n.notification_type == NotificationType::Reminder
                && n.data.get("vocabTrainerId").and_then(|v| v.as_str()) == Some(trainer_id)
                && n.data.get("remindAt").and_then(|v| v.as_str()) == Some(key.as_str())
        }))
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool, RepositoryError> {
        let mut notifications = self.notifications.write();
        match notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl VocabRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Vocab>, RepositoryError> {
        Ok(self.vocabs.read().get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Vocab>, RepositoryError> {
        let vocabs = self.vocabs.read();
        Ok(ids.iter().filter_map(|id| vocabs.get(id).cloned()).collect())
    }

    async fn create(&self, vocab: &Vocab) -> Result<Vocab, RepositoryError> {
        self.vocabs.write().insert(vocab.id.clone(), vocab.clone());
        Ok(vocab.clone())
    }

    async fn update_text_targets(
        &self,
        id: &str,
        targets: &[TextTarget],
    ) -> Result<Vocab, RepositoryError> {
        let mut vocabs = self.vocabs.write();
        let vocab = vocabs
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("vocab", id))?;
        vocab.text_targets = targets.to_vec();
        Ok(vocab.clone())
    }
}
