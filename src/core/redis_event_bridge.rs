use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{EventBus, TrainerEvent};

const CHANNEL_PREFIX: &str = "vt:events:";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Wire form on the Redis channel. `origin` lets a node drop its own echo.
#[derive(Debug, Serialize, Deserialize)]
struct BridgedEvent {
    origin: String,
    event: TrainerEvent,
}

/// Fans realtime events out across API/worker processes through Redis
/// pub/sub so a client connected to one node sees progress from a worker
/// running on another.
pub struct RedisEventBridge {
    event_bus: Arc<EventBus>,
    redis_url: String,
    node_id: String,
    connection: RwLock<Option<MultiplexedConnection>>,
    running: RwLock<bool>,
}

impl RedisEventBridge {
    pub fn new(event_bus: Arc<EventBus>, redis_url: String) -> Self {
        Self {
            event_bus,
            redis_url,
            node_id: uuid::Uuid::new_v4().to_string(),
            connection: RwLock::new(None),
            running: RwLock::new(false),
        }
    }

    async fn get_connection(&self) -> Option<MultiplexedConnection> {
        let conn = self.connection.read().await;
        conn.clone()
    }

    async fn connect(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let conn = client.get_multiplexed_tokio_connection().await?;

        {
            let mut connection = self.connection.write().await;
            *connection = Some(conn.clone());
        }

        info!("Redis event bridge connected");
        Ok(conn)
    }

    pub async fn publish_to_redis(&self, event: &TrainerEvent) -> Result<(), RedisEventError> {
        let mut conn = match self.get_connection().await {
            Some(c) => c,
            None => self.connect().await.map_err(RedisEventError::Connection)?,
        };

        let channel = format!("{}{}", CHANNEL_PREFIX, event.event_type());
        let wire = BridgedEvent {
            origin: self.node_id.clone(),
            event: event.clone(),
        };
        let payload = serde_json::to_string(&wire).map_err(RedisEventError::Serialization)?;

        if let Err(e) = conn.publish::<_, _, i64>(&channel, &payload).await {
            self.connection.write().await.take();
            return Err(RedisEventError::Publish(e));
        }

        debug!(channel = %channel, "Event published to Redis");
        Ok(())
    }

    pub async fn start_subscriber(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Redis subscriber already running");
                return;
            }
            *running = true;
        }

        info!(node_id = %self.node_id, "Starting Redis event subscriber");

        let bridge = Arc::clone(&self);
        tokio::spawn(async move {
            bridge.subscriber_loop().await;
        });
    }

    async fn subscriber_loop(&self) {
        loop {
            if !*self.running.read().await {
                info!("Redis subscriber stopped");
                break;
            }

            match self.subscribe_and_listen().await {
                Ok(_) => {
                    info!("Redis subscription ended normally");
                }
                Err(e) => {
                    error!(error = %e, "Redis subscription error, reconnecting...");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn subscribe_and_listen(&self) -> Result<(), RedisEventError> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(RedisEventError::Connection)?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(RedisEventError::Connection)?;

        let pattern = format!("{}*", CHANNEL_PREFIX);
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(RedisEventError::Subscribe)?;
        debug!(pattern = %pattern, "Subscribed to Redis pattern");

        use futures_util::StreamExt;
        let mut stream = pubsub.on_message();

        loop {
            if !*self.running.read().await {
                break;
            }

            let msg = match tokio::time::timeout(Duration::from_secs(30), stream.next()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    warn!("Redis subscription stream ended");
                    break;
                }
                Err(_) => continue,
            };

            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Failed to get message payload");
                    continue;
                }
            };

            match serde_json::from_str::<BridgedEvent>(&payload) {
                Ok(wire) if wire.origin == self.node_id => {}
                Ok(wire) => self.event_bus.publish(wire.event).await,
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize bridged event");
                }
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Redis event bridge stopping");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RedisEventError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish error: {0}")]
    Publish(redis::RedisError),

    #[error("Subscribe error: {0}")]
    Subscribe(redis::RedisError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobProgressPayload;
    use chrono::Utc;

    #[test]
    fn bridged_event_round_trips_origin() {
        let wire = BridgedEvent {
            origin: "node-a".to_string(),
            event: TrainerEvent::Completed(JobProgressPayload {
                job_id: "j".to_string(),
                user_id: "u".to_string(),
                queue: "audio-evaluation".to_string(),
                vocab_trainer_id: None,
                payload: None,
                error: None,
                timestamp: Utc::now(),
            }),
        };
        let text = serde_json::to_string(&wire).unwrap();
        let back: BridgedEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back.origin, "node-a");
        assert_eq!(back.event.event_type(), "completed");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_bridge_publish() {
        let event_bus = Arc::new(EventBus::new());
        let bridge = RedisEventBridge::new(event_bus, "redis://localhost:6379".to_string());
        let event = TrainerEvent::Generating(JobProgressPayload {
            job_id: "j".to_string(),
            user_id: "test_user".to_string(),
            queue: "dialogue-generation".to_string(),
            vocab_trainer_id: Some("t".to_string()),
            payload: None,
            error: None,
            timestamp: Utc::now(),
        });
        assert!(bridge.publish_to_redis(&event).await.is_ok());
    }
}
