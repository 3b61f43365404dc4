use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::db::{MasteryRepository, RepositoryError};
use crate::domain::{MasteryHistoryEntry, VocabMastery};

pub struct MasteryTracker {
    repo: Arc<dyn MasteryRepository>,
}

impl MasteryTracker {
    pub fn new(repo: Arc<dyn MasteryRepository>) -> Self {
        Self { repo }
    }

    /// Records one graded answer: get-or-create the (vocab, user) row, move
    /// the score one step, then append a history snapshot. History failures
    /// are logged and never returned.
    pub async fn update_mastery(
        &self,
        vocab_id: &str,
        user_id: &str,
        is_correct: bool,
    ) -> Result<VocabMastery, RepositoryError> {
        let existing = match self.repo.find_by_vocab_id_and_user_id(vocab_id, user_id).await? {
            Some(m) => m,
            None => self.repo.create(&VocabMastery::new(vocab_id, user_id)).await?,
        };

        let updated = self.repo.apply_grade(&existing.id, is_correct, Utc::now()).await?;
        debug!(
            vocab_id,
            user_id,
            is_correct,
            score = updated.mastery_score,
            "Mastery updated"
        );

        if let Err(e) = self.repo.append_history(&MasteryHistoryEntry::snapshot(&updated)).await {
            warn!(error = %e, vocab_id, user_id, "Mastery history write failed");
        }

        Ok(updated)
    }

    pub async fn find(&self, vocab_id: &str, user_id: &str) -> Result<Option<VocabMastery>, RepositoryError> {
        self.repo.find_by_vocab_id_and_user_id(vocab_id, user_id).await
    }

    pub async fn history(
        &self,
        vocab_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MasteryHistoryEntry>, RepositoryError> {
        self.repo.history(vocab_id, user_id, limit.clamp(1, 500)).await
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<VocabMastery>, RepositoryError> {
        self.repo.list_by_user(user_id).await
    }
}
