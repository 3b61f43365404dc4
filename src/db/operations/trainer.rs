use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::db::repository::{RepositoryError, TrainerRepository};
use crate::db::DatabaseProxy;
use crate::domain::{
    NewTrainer, NewTrainerResult, QuestionAnswers, QuestionType, ResultStatus, Trainer,
    TrainerResult, TrainerStatus,
};

use super::vocab::map_vocab;
use super::{get_json, get_optional_timestamp, get_timestamp, to_naive};

fn map_trainer_row(row: &PgRow) -> Result<Trainer, RepositoryError> {
    let id: String = row.try_get("id")?;
    let raw_type: String = row.try_get("questionType")?;
    let question_type = QuestionType::parse(&raw_type).ok_or_else(|| RepositoryError::Decode {
        entity: "trainer",
        message: format!("unknown question type {raw_type} on {id}"),
    })?;
    let question_answers = QuestionAnswers::decode(question_type, &get_json(row, "questionAnswers"))
        .map_err(|e| RepositoryError::Decode {
            entity: "trainer",
            message: format!("questionAnswers of {id}: {e}"),
        })?;
    let status: String = row.try_get("status")?;

    Ok(Trainer {
        id,
        user_id: row.try_get("userId")?,
        name: row.try_get("name")?,
        question_type,
        status: TrainerStatus::parse(&status),
        question_answers,
        count_time: row.try_get("countTime").unwrap_or(0),
        set_count_time: row.try_get("setCountTime").unwrap_or(0),
        reminder_repeat: row.try_get("reminderRepeat").unwrap_or(0),
        reminder_last_remind: get_optional_timestamp(row, "reminderLastRemind"),
        reminder_disabled: row.try_get("reminderDisabled").unwrap_or(false),
        vocabs: Vec::new(),
        results: Vec::new(),
        version: row.try_get("version")?,
        created_at: get_timestamp(row, "createdAt"),
        updated_at: get_timestamp(row, "updatedAt"),
    })
}

fn map_result(row: &PgRow) -> Result<TrainerResult, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(TrainerResult {
        id: row.try_get("id")?,
        trainer_id: row.try_get("trainerId")?,
        vocab_id: row.try_get::<Option<String>, _>("vocabId").ok().flatten(),
        status: ResultStatus::parse(&status),
        user_selected: row.try_get("userSelected").unwrap_or_default(),
        system_selected: row.try_get("systemSelected").unwrap_or_default(),
        data: get_json(row, "data"),
        created_at: get_timestamp(row, "createdAt"),
    })
}

impl DatabaseProxy {
    async fn load_trainer(&self, row: &PgRow) -> Result<Trainer, RepositoryError> {
        let mut trainer = map_trainer_row(row)?;

        let vocab_rows = sqlx::query(
            r#"
            SELECT v.* FROM "vocabs" v
            JOIN "vocab_trainer_vocabs" tv ON tv."vocabId" = v."id"
            WHERE tv."trainerId" = $1
            ORDER BY tv."position" ASC
            "#,
        )
        .bind(&trainer.id)
        .fetch_all(self.pool())
        .await?;
        trainer.vocabs = vocab_rows.iter().map(map_vocab).collect::<Result<_, _>>()?;

        let result_rows = sqlx::query(
            r#"SELECT * FROM "vocab_trainer_results" WHERE "trainerId" = $1 ORDER BY "createdAt" ASC"#,
        )
        .bind(&trainer.id)
        .fetch_all(self.pool())
        .await?;
        trainer.results = result_rows.iter().map(map_result).collect::<Result<_, _>>()?;

        Ok(trainer)
    }

    async fn replace_vocab_links(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        trainer_id: &str,
        vocab_ids: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(r#"DELETE FROM "vocab_trainer_vocabs" WHERE "trainerId" = $1"#)
            .bind(trainer_id)
            .execute(&mut **tx)
            .await?;
        for (position, vocab_id) in vocab_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO "vocab_trainer_vocabs" ("trainerId", "vocabId", "position")
                VALUES ($1, $2, $3)
                ON CONFLICT ("trainerId", "vocabId") DO NOTHING
                "#,
            )
            .bind(trainer_id)
            .bind(vocab_id)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TrainerRepository for DatabaseProxy {
    async fn find_by_id(&self, id: &str) -> Result<Option<Trainer>, RepositoryError> {
        let row = sqlx::query(r#"SELECT * FROM "vocab_trainers" WHERE "id" = $1 LIMIT 1"#)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => Ok(Some(self.load_trainer(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Trainer>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM "vocab_trainers" WHERE "userId" = $1 ORDER BY "createdAt" DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        let mut trainers = Vec::with_capacity(rows.len());
        for row in &rows {
            trainers.push(self.load_trainer(row).await?);
        }
        Ok(trainers)
    }

    async fn create(&self, input: NewTrainer) -> Result<Trainer, RepositoryError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = to_naive(Utc::now());
        let empty = QuestionAnswers::empty(input.question_type).to_json();

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO "vocab_trainers" (
                "id", "userId", "name", "questionType", "status", "questionAnswers",
                "countTime", "setCountTime", "reminderRepeat", "reminderDisabled",
                "version", "createdAt", "updatedAt"
            ) VALUES ($1, $2, $3, $4, 'PENDING', $5, 0, $6, 0, FALSE, 0, $7, $7)
            "#,
        )
        .bind(&id)
        .bind(&input.user_id)
        .bind(&input.name)
        .bind(input.question_type.as_str())
        .bind(empty)
        .bind(input.set_count_time)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        Self::replace_vocab_links(&mut tx, &id, &input.vocab_ids).await?;
        tx.commit().await?;

        TrainerRepository::find_by_id(self, &id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("trainer", id))
    }

    async fn update(&self, trainer: &Trainer) -> Result<Trainer, RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE "vocab_trainers" SET
                "name" = $3,
                "status" = $4,
                "questionAnswers" = $5,
                "countTime" = $6,
                "setCountTime" = $7,
                "reminderRepeat" = $8,
                "reminderLastRemind" = $9,
                "reminderDisabled" = $10,
                "version" = "version" + 1,
                "updatedAt" = $11
            WHERE "id" = $1 AND "version" = $2
            "#,
        )
        .bind(&trainer.id)
        .bind(trainer.version)
        .bind(&trainer.name)
        .bind(trainer.status.as_str())
        .bind(trainer.question_answers.to_json())
        .bind(trainer.count_time)
        .bind(trainer.set_count_time)
        .bind(trainer.reminder_repeat)
        .bind(trainer.reminder_last_remind.map(to_naive))
        .bind(trainer.reminder_disabled)
        .bind(to_naive(Utc::now()))
        .execute(self.pool())
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar(r#"SELECT "version" FROM "vocab_trainers" WHERE "id" = $1"#)
                    .bind(&trainer.id)
                    .fetch_optional(self.pool())
                    .await?;
            return Err(match exists {
                Some(_) => RepositoryError::Conflict {
                    entity: "trainer",
                    id: trainer.id.clone(),
                    expected: trainer.version,
                },
                None => RepositoryError::not_found("trainer", &trainer.id),
            });
        }

        TrainerRepository::find_by_id(self, &trainer.id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("trainer", &trainer.id))
    }

    async fn set_vocabs(&self, trainer_id: &str, vocab_ids: &[String]) -> Result<(), RepositoryError> {
        let mut tx = self.pool().begin().await?;
        Self::replace_vocab_links(&mut tx, trainer_id, vocab_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(r#"DELETE FROM "vocab_trainers" WHERE "id" = $1"#)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_results(
        &self,
        trainer_id: &str,
        results: &[NewTrainerResult],
    ) -> Result<Vec<TrainerResult>, RepositoryError> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(results.len());
        let mut tx = self.pool().begin().await?;
        for result in results {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO "vocab_trainer_results" (
                    "id", "trainerId", "vocabId", "status", "userSelected", "systemSelected",
                    "data", "createdAt"
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&id)
            .bind(trainer_id)
            .bind(&result.vocab_id)
            .bind(result.status.as_str())
            .bind(&result.user_selected)
            .bind(&result.system_selected)
            .bind(&result.data)
            .bind(to_naive(now))
            .execute(&mut *tx)
            .await?;
            created.push(TrainerResult {
                id,
                trainer_id: trainer_id.to_string(),
                vocab_id: result.vocab_id.clone(),
                status: result.status,
                user_selected: result.user_selected.clone(),
                system_selected: result.system_selected.clone(),
                data: result.data.clone(),
                created_at: now,
            });
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn delete_results_by_trainer_id(&self, trainer_id: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query(r#"DELETE FROM "vocab_trainer_results" WHERE "trainerId" = $1"#)
            .bind(trainer_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_due_reminders(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Trainer>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "vocab_trainers"
            WHERE "reminderDisabled" = FALSE
              AND "reminderLastRemind" > $1
              AND "reminderLastRemind" <= $2
            ORDER BY "reminderLastRemind" ASC
            LIMIT $3
            "#,
        )
        .bind(to_naive(since))
        .bind(to_naive(until))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        let mut trainers = Vec::with_capacity(rows.len());
        for row in &rows {
            trainers.push(self.load_trainer(row).await?);
        }
        Ok(trainers)
    }
}
