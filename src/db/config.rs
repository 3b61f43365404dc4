use std::time::Duration;

use thiserror::Error;

use crate::config::{env_parse, env_string};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub primary_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let primary_url = env_string("DATABASE_URL").ok_or(DbConfigError::Missing {
            key: "DATABASE_URL",
        })?;
        Ok(Self::with_url(primary_url))
    }

    pub fn with_url(primary_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
            acquire_timeout: Duration::from_millis(env_parse("DB_ACQUIRE_TIMEOUT_MS").unwrap_or(5000)),
            run_migrations: std::env::var("DB_RUN_MIGRATIONS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("missing required env var {key}")]
    Missing { key: &'static str },
}
