use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

pub const KEY_AI_MODEL: &str = "ai.model";
pub const KEY_QUESTION_COUNT: &str = "exam.multiple_choice.question_count";
pub const KEY_SOURCE_TO_TARGET_PROBABILITY: &str = "exam.multiple_choice.source_to_target_probability";

/// Two-tier key/value lookup: a user override wins over the system default.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn get(&self, user_id: Option<&str>, key: &str) -> Option<String>;
}

pub async fn resolve_parsed<T: std::str::FromStr>(
    resolver: &dyn ConfigResolver,
    user_id: Option<&str>,
    key: &str,
) -> Option<T> {
    resolver.get(user_id, key).await?.trim().parse().ok()
}

/// Process-local resolver, used when no database is configured and by tests.
#[derive(Debug, Default)]
pub struct StaticConfigResolver {
    system: RwLock<HashMap<String, String>>,
    users: RwLock<HashMap<(String, String), String>>,
}

impl StaticConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_system(&self, key: &str, value: impl Into<String>) {
        self.system.write().insert(key.to_string(), value.into());
    }

    pub fn set_user(&self, user_id: &str, key: &str, value: impl Into<String>) {
        self.users
            .write()
            .insert((user_id.to_string(), key.to_string()), value.into());
    }
}

#[async_trait]
impl ConfigResolver for StaticConfigResolver {
    async fn get(&self, user_id: Option<&str>, key: &str) -> Option<String> {
        if let Some(user_id) = user_id {
            let users = self.users.read();
            if let Some(value) = users.get(&(user_id.to_string(), key.to_string())) {
                if !value.trim().is_empty() {
                    return Some(value.clone());
                }
            }
        }
        self.system
            .read()
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_override_wins_over_system_default() {
        let resolver = StaticConfigResolver::new();
        resolver.set_system(KEY_AI_MODEL, "system-model");
        resolver.set_user("u1", KEY_AI_MODEL, "user-model");

        assert_eq!(resolver.get(Some("u1"), KEY_AI_MODEL).await.as_deref(), Some("user-model"));
        assert_eq!(resolver.get(Some("u2"), KEY_AI_MODEL).await.as_deref(), Some("system-model"));
        assert_eq!(resolver.get(None, KEY_AI_MODEL).await.as_deref(), Some("system-model"));
        assert_eq!(resolver.get(None, "missing").await, None);
    }

    #[tokio::test]
    async fn blank_user_value_falls_through() {
        let resolver = StaticConfigResolver::new();
        resolver.set_system(KEY_QUESTION_COUNT, "5");
        resolver.set_user("u1", KEY_QUESTION_COUNT, "  ");
        let count: Option<usize> = resolve_parsed(&resolver, Some("u1"), KEY_QUESTION_COUNT).await;
        assert_eq!(count, Some(5));
    }
}
