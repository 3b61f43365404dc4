use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::db::repository::{MasteryRepository, RepositoryError};
use crate::db::DatabaseProxy;
use crate::domain::{MasteryHistoryEntry, VocabMastery};

use super::{get_optional_timestamp, get_timestamp, to_naive};

fn map_mastery(row: &PgRow) -> Result<VocabMastery, RepositoryError> {
    Ok(VocabMastery {
        id: row.try_get("id")?,
        vocab_id: row.try_get("vocabId")?,
        user_id: row.try_get("userId")?,
        mastery_score: row.try_get("masteryScore")?,
        correct_count: row.try_get("correctCount").unwrap_or(0),
        incorrect_count: row.try_get("incorrectCount").unwrap_or(0),
        last_reviewed_at: get_optional_timestamp(row, "lastReviewedAt"),
        created_at: get_timestamp(row, "createdAt"),
        updated_at: get_timestamp(row, "updatedAt"),
    })
}

fn map_history(row: &PgRow) -> Result<MasteryHistoryEntry, RepositoryError> {
    Ok(MasteryHistoryEntry {
        id: row.try_get("id")?,
        mastery_id: row.try_get("masteryId")?,
        vocab_id: row.try_get("vocabId")?,
        user_id: row.try_get("userId")?,
        mastery_score: row.try_get("masteryScore")?,
        correct_count: row.try_get("correctCount")?,
        incorrect_count: row.try_get("incorrectCount")?,
        created_at: get_timestamp(row, "createdAt"),
    })
}

#[async_trait]
impl MasteryRepository for DatabaseProxy {
    async fn find_by_vocab_id_and_user_id(
        &self,
        vocab_id: &str,
        user_id: &str,
    ) -> Result<Option<VocabMastery>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM "vocab_masteries" WHERE "vocabId" = $1 AND "userId" = $2 LIMIT 1"#,
        )
        .bind(vocab_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(map_mastery).transpose()
    }

    async fn create(&self, mastery: &VocabMastery) -> Result<VocabMastery, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO "vocab_masteries" (
                "id", "vocabId", "userId", "masteryScore", "correctCount", "incorrectCount",
                "lastReviewedAt", "createdAt", "updatedAt"
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ("vocabId", "userId") DO NOTHING
            "#,
        )
        .bind(&mastery.id)
        .bind(&mastery.vocab_id)
        .bind(&mastery.user_id)
        .bind(mastery.mastery_score)
        .bind(mastery.correct_count)
        .bind(mastery.incorrect_count)
        .bind(mastery.last_reviewed_at.map(to_naive))
        .bind(to_naive(mastery.created_at))
        .bind(to_naive(mastery.updated_at))
        .execute(self.pool())
        .await?;

        self.find_by_vocab_id_and_user_id(&mastery.vocab_id, &mastery.user_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("vocab mastery", &mastery.id))
    }

    async fn apply_grade(
        &self,
        id: &str,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<VocabMastery, RepositoryError> {
        let delta: i32 = if is_correct { 1 } else { -1 };
        let row = sqlx::query(
            r#"
            UPDATE "vocab_masteries" SET
                "masteryScore" = LEAST(GREATEST("masteryScore" + $2, 0), 10),
                "correctCount" = "correctCount" + CASE WHEN $3 THEN 1 ELSE 0 END,
                "incorrectCount" = "incorrectCount" + CASE WHEN $3 THEN 0 ELSE 1 END,
                "lastReviewedAt" = $4,
                "updatedAt" = $4
            WHERE "id" = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(is_correct)
        .bind(to_naive(at))
        .fetch_optional(self.pool())
        .await?;
        match row {
            Some(row) => map_mastery(&row),
            None => Err(RepositoryError::not_found("vocab mastery", id)),
        }
    }

    async fn append_history(&self, entry: &MasteryHistoryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO "vocab_mastery_history" (
                "id", "masteryId", "vocabId", "userId", "masteryScore",
                "correctCount", "incorrectCount", "createdAt"
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.mastery_id)
        .bind(&entry.vocab_id)
        .bind(&entry.user_id)
        .bind(entry.mastery_score)
        .bind(entry.correct_count)
        .bind(entry.incorrect_count)
        .bind(to_naive(entry.created_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn history(
        &self,
        vocab_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MasteryHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "vocab_mastery_history"
            WHERE "vocabId" = $1 AND "userId" = $2
            ORDER BY "createdAt" DESC
            LIMIT $3
            "#,
        )
        .bind(vocab_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_history).collect()
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<VocabMastery>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM "vocab_masteries" WHERE "userId" = $1 ORDER BY "updatedAt" DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_mastery).collect()
    }
}
