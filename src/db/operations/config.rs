use async_trait::async_trait;

use crate::db::DatabaseProxy;
use crate::services::app_config::ConfigResolver;

#[async_trait]
impl ConfigResolver for DatabaseProxy {
    async fn get(&self, user_id: Option<&str>, key: &str) -> Option<String> {
        if let Some(user_id) = user_id {
            let user_value: Result<Option<String>, sqlx::Error> = sqlx::query_scalar(
                r#"SELECT "value" FROM "user_configs" WHERE "userId" = $1 AND "key" = $2 LIMIT 1"#,
            )
            .bind(user_id)
            .bind(key)
            .fetch_optional(self.pool())
            .await;
            match user_value {
                Ok(Some(value)) if !value.trim().is_empty() => return Some(value),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, key, "user config lookup failed"),
            }
        }

        let system_value: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar(r#"SELECT "value" FROM "system_configs" WHERE "key" = $1 LIMIT 1"#)
                .bind(key)
                .fetch_optional(self.pool())
                .await;
        match system_value {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, key, "system config lookup failed");
                None
            }
        }
    }
}
