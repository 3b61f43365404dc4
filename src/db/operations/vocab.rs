use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::db::repository::{RepositoryError, VocabRepository};
use crate::db::DatabaseProxy;
use crate::domain::{TextTarget, Vocab};

use super::{get_json, get_timestamp, to_naive};

pub(crate) fn map_vocab(row: &PgRow) -> Result<Vocab, RepositoryError> {
    let targets = get_json(row, "textTargets");
    let text_targets: Vec<TextTarget> = if targets.is_null() {
        Vec::new()
    } else {
        serde_json::from_value(targets).map_err(|e| RepositoryError::Decode {
            entity: "vocab",
            message: e.to_string(),
        })?
    };
    Ok(Vocab {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        text_source: row.try_get("textSource")?,
        source_language_code: row.try_get("sourceLanguageCode")?,
        target_language_code: row.try_get("targetLanguageCode")?,
        text_targets,
        created_at: get_timestamp(row, "createdAt"),
    })
}

fn encode_targets(targets: &[TextTarget]) -> serde_json::Value {
    serde_json::to_value(targets).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

#[async_trait]
impl VocabRepository for DatabaseProxy {
    async fn find_by_id(&self, id: &str) -> Result<Option<Vocab>, RepositoryError> {
        let row = sqlx::query(r#"SELECT * FROM "vocabs" WHERE "id" = $1 LIMIT 1"#)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(map_vocab).transpose()
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Vocab>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(r#"SELECT * FROM "vocabs" WHERE "id" = ANY($1)"#)
            .bind(ids)
            .fetch_all(self.pool())
            .await?;
        let mut found = rows.iter().map(map_vocab).collect::<Result<Vec<_>, _>>()?;
        found.sort_by_key(|v| ids.iter().position(|id| *id == v.id).unwrap_or(usize::MAX));
        Ok(found)
    }

    async fn create(&self, vocab: &Vocab) -> Result<Vocab, RepositoryError> {
        let now = to_naive(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO "vocabs" (
                "id", "userId", "textSource", "sourceLanguageCode", "targetLanguageCode",
                "textTargets", "createdAt", "updatedAt"
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&vocab.id)
        .bind(&vocab.user_id)
        .bind(&vocab.text_source)
        .bind(&vocab.source_language_code)
        .bind(&vocab.target_language_code)
        .bind(encode_targets(&vocab.text_targets))
        .bind(to_naive(vocab.created_at))
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(vocab.clone())
    }

    async fn update_text_targets(
        &self,
        id: &str,
        targets: &[TextTarget],
    ) -> Result<Vocab, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE "vocabs" SET "textTargets" = $2, "updatedAt" = $3
            WHERE "id" = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(encode_targets(targets))
        .bind(to_naive(Utc::now()))
        .fetch_optional(self.pool())
        .await?;
        match row {
            Some(row) => map_vocab(&row),
            None => Err(RepositoryError::not_found("vocab", id)),
        }
    }
}
