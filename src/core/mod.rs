mod event_bus;
mod redis_event_bridge;

use std::sync::Arc;

pub use event_bus::{
    EventBus, EventEnvelope, EventFilter, JobProgressPayload, NotificationPayload, TrainerEvent,
};
pub use redis_event_bridge::{RedisEventBridge, RedisEventError};

/// Publishes to the local bus and, when configured, to the Redis bridge.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<EventBus>,
    bridge: Option<Arc<RedisEventBridge>>,
}

impl EventPublisher {
    pub fn new(bus: Arc<EventBus>, bridge: Option<Arc<RedisEventBridge>>) -> Self {
        Self { bus, bridge }
    }

    pub fn local(bus: Arc<EventBus>) -> Self {
        Self::new(bus, None)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub async fn publish(&self, event: TrainerEvent) {
        if let Some(bridge) = &self.bridge {
            if let Err(e) = bridge.publish_to_redis(&event).await {
                tracing::warn!(error = %e, event_type = event.event_type(), "Redis event publish failed");
            }
        }
        self.bus.publish(event).await;
    }
}
