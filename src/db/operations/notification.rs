use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::db::repository::{remind_key, NotificationRepository, RepositoryError};
use crate::db::DatabaseProxy;
use crate::domain::{NewNotification, Notification, NotificationPriority, NotificationType};

use super::{get_json, get_timestamp, to_naive};

fn map_notification(row: &PgRow) -> Result<Notification, RepositoryError> {
    let notification_type: String = row.try_get("type")?;
    let priority: String = row.try_get("priority").unwrap_or_else(|_| "NORMAL".to_string());
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        notification_type: NotificationType::from_str(&notification_type),
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        priority: NotificationPriority::from_str(&priority),
        data: get_json(row, "data"),
        is_read: row.try_get("isRead").unwrap_or(false),
        created_at: get_timestamp(row, "createdAt"),
    })
}

#[async_trait]
impl NotificationRepository for DatabaseProxy {
    async fn create(&self, input: NewNotification) -> Result<Notification, RepositoryError> {
        let notification = Notification::from_new(input);
        // A concurrent delivery of the same reminder loses on the dedupe index.
        let inserted = sqlx::query(
            r#"
            INSERT INTO "notifications" (
                "id", "userId", "type", "title", "message", "priority", "data", "isRead", "createdAt"
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.priority.as_str())
        .bind(&notification.data)
        .bind(to_naive(notification.created_at))
        .execute(self.pool())
        .await?;

        if inserted.rows_affected() == 0 {
            let row = sqlx::query(
                r#"
                SELECT * FROM "notifications"
                WHERE "type" = 'REMINDER'
                  AND "data"->>'vocabTrainerId' = $1
                  AND "data"->>'remindAt' = $2
                LIMIT 1
                "#,
            )
            .bind(notification.data.get("vocabTrainerId").and_then(|v| v.as_str()))
            .bind(notification.data.get("remindAt").and_then(|v| v.as_str()))
            .fetch_optional(self.pool())
            .await?;
            if let Some(row) = row {
                return map_notification(&row);
            }
        }

        Ok(notification)
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "notifications"
            WHERE "userId" = $1
            ORDER BY "createdAt" DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_notification).collect()
    }

    async fn reminder_exists(
        &self,
        trainer_id: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM "notifications"
                WHERE "type" = 'REMINDER'
                  AND "data"->>'vocabTrainerId' = $1
                  AND "data"->>'remindAt' = $2
            )
            "#,
        )
        .bind(trainer_id)
        .bind(remind_key(remind_at))
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE "notifications" SET "isRead" = TRUE WHERE "id" = $1 AND "userId" = $2"#,
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
