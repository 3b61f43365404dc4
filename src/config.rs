use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::ai::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub trainer: TrainerSettings,
    pub retry: RetryPolicy,
    pub worker: WorkerSettings,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            host,
            port,
            log_level,
            database_url: env_string("DATABASE_URL"),
            redis_url: env_string("REDIS_URL"),
            trainer: TrainerSettings::from_env(),
            retry: RetryPolicy::from_env(),
            worker: WorkerSettings::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Knobs of the trainer lifecycle and of exam generation.
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    /// Number of PASSED gradings after which a trainer is retired.
    pub max_repeat: i32,
    pub reminder_interval: chrono::Duration,
    /// Percentage of correct answers needed to pass.
    pub pass_threshold: f64,
    pub question_count: usize,
    /// Probability of asking source → target in multiple choice.
    pub source_to_target_probability: f64,
}

impl TrainerSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_repeat: env_parse("TRAINER_MAX_REPEAT").unwrap_or(defaults.max_repeat),
            reminder_interval: env_parse::<i64>("TRAINER_REMINDER_INTERVAL_HOURS")
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.reminder_interval),
            pass_threshold: env_parse("TRAINER_PASS_THRESHOLD").unwrap_or(defaults.pass_threshold),
            question_count: env_parse::<usize>("MC_QUESTION_COUNT")
                .filter(|count| *count >= 2)
                .unwrap_or(defaults.question_count),
            source_to_target_probability: env_parse::<f64>("MC_SOURCE_TO_TARGET_PROBABILITY")
                .filter(|p| (0.0..=1.0).contains(p))
                .unwrap_or(defaults.source_to_target_probability),
        }
    }
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            max_repeat: 6,
            reminder_interval: chrono::Duration::days(2),
            pass_threshold: 70.0,
            question_count: 4,
            source_to_target_probability: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub enabled: bool,
    pub concurrency: usize,
    pub reminder_sweep_schedule: String,
    pub poll_interval: Duration,
}

impl WorkerSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("WORKER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enabled),
            concurrency: env_parse::<usize>("WORKER_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            reminder_sweep_schedule: env_string("REMINDER_SWEEP_SCHEDULE")
                .unwrap_or(defaults.reminder_sweep_schedule),
            poll_interval: env_parse::<u64>("QUEUE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 2,
            reminder_sweep_schedule: "0 */15 * * * *".to_string(),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.trim().parse().ok()
}
