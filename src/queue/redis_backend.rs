use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::tracker::JobRecord;
use super::{JobBackend, JobEnvelope, QueueError};

const KEY_PREFIX: &str = "vt:queue";
const RECORD_TTL_SECS: u64 = 24 * 60 * 60;
const ACTIVE_TTL_SECS: u64 = 30 * 60;
const PROMOTE_BATCH: isize = 50;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Shared backend for multi-process deployments: a list per queue for ready
/// jobs, a sorted set scored by due time for delayed ones.
pub struct RedisBackend {
    redis_url: String,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            connection: RwLock::new(None),
        }
    }

    async fn conn(&self) -> Result<MultiplexedConnection, QueueError> {
        if let Some(conn) = self.connection.read().await.clone() {
            return Ok(conn);
        }
        let client = redis::Client::open(self.redis_url.as_str())?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        *self.connection.write().await = Some(conn.clone());
        info!("Redis job queue connected");
        Ok(conn)
    }

    fn wait_key(queue: &str) -> String {
        format!("{KEY_PREFIX}:{queue}:wait")
    }

    fn delayed_key(queue: &str) -> String {
        format!("{KEY_PREFIX}:{queue}:delayed")
    }

    fn dead_key(queue: &str) -> String {
        format!("{KEY_PREFIX}:{queue}:dead")
    }

    fn record_key(job_id: &str) -> String {
        format!("{KEY_PREFIX}:job:{job_id}")
    }

    fn active_key(queue: &str, key: &str) -> String {
        format!("{KEY_PREFIX}:{queue}:active:{key}")
    }

    /// Moves due delayed jobs onto the ready list. ZREM guards against two
    /// consumers promoting the same member.
    async fn promote_due(&self, conn: &mut MultiplexedConnection, queue: &str) -> Result<(), QueueError> {
        let delayed = Self::delayed_key(queue);
        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(&delayed, "-inf", now, 0, PROMOTE_BATCH)
            .await?;
        for member in due {
            let removed: i64 = conn.zrem(&delayed, &member).await?;
            if removed == 1 {
                let _: i64 = conn.lpush(Self::wait_key(queue), &member).await?;
                debug!(queue = %queue, "Promoted delayed job");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobBackend for RedisBackend {
    async fn push(&self, job: JobEnvelope, delay: Option<Duration>) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let raw = serde_json::to_string(&job)?;
        match delay.filter(|d| !d.is_zero()) {
            None => {
                let _: i64 = conn.lpush(Self::wait_key(&job.queue), raw).await?;
            }
            Some(delay) => {
                let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                let _: i64 = conn.zadd(Self::delayed_key(&job.queue), raw, due).await?;
            }
        }
        Ok(())
    }

    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<JobEnvelope>, QueueError> {
        let mut conn = self.conn().await?;
        self.promote_due(&mut conn, queue).await?;
        let raw: Option<String> = conn.rpop(Self::wait_key(queue), None).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn dead_letter(&self, job: JobEnvelope) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let raw = serde_json::to_string(&job)?;
        let _: i64 = conn.lpush(Self::dead_key(&job.queue), raw).await?;
        Ok(())
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<JobEnvelope>, QueueError> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.lrange(Self::dead_key(queue), 0, -1).await?;
        raw.iter()
            .map(|r| serde_json::from_str(r).map_err(QueueError::from))
            .collect()
    }

    async fn put_record(&self, record: &JobRecord) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let raw = serde_json::to_string(record)?;
        let _: () = conn.set_ex(Self::record_key(&record.id), raw, RECORD_TTL_SECS).await?;
        Ok(())
    }

    async fn get_record(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(Self::record_key(job_id)).await?;
        raw.map(|r| serde_json::from_str(&r).map_err(QueueError::from))
            .transpose()
    }

    async fn claim_active(&self, queue: &str, key: &str, job_id: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn().await?;
        let key = Self::active_key(queue, key);
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(job_id)
            .arg("NX")
            .arg("EX")
            .arg(ACTIVE_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if set.is_some() {
            return Ok(None);
        }
        let existing: Option<String> = conn.get(&key).await?;
        Ok(existing.filter(|id| id != job_id))
    }

    async fn release_active(&self, queue: &str, key: &str, job_id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(Self::active_key(queue, key))
            .arg(job_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_queue() {
        assert_eq!(RedisBackend::wait_key("audio-evaluation"), "vt:queue:audio-evaluation:wait");
        assert_eq!(
            RedisBackend::active_key("multiple-choice-generation", "t1"),
            "vt:queue:multiple-choice-generation:active:t1"
        );
    }
}
