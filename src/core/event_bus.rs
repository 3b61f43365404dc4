use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::domain::Notification;

const CHANNEL_CAPACITY: usize = 1024;

/// Realtime events pushed to the originating client. Progress events follow
/// `generating`/`evaluating` → `completed` | `failed` per job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrainerEvent {
    Generating(JobProgressPayload),
    Evaluating(JobProgressPayload),
    Completed(JobProgressPayload),
    Failed(JobProgressPayload),
    Notification(NotificationPayload),
}

impl TrainerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TrainerEvent::Generating(_) => "generating",
            TrainerEvent::Evaluating(_) => "evaluating",
            TrainerEvent::Completed(_) => "completed",
            TrainerEvent::Failed(_) => "failed",
            TrainerEvent::Notification(_) => "notification",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            TrainerEvent::Generating(p)
            | TrainerEvent::Evaluating(p)
            | TrainerEvent::Completed(p)
            | TrainerEvent::Failed(p) => &p.user_id,
            TrainerEvent::Notification(p) => &p.notification.user_id,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            TrainerEvent::Generating(p)
            | TrainerEvent::Evaluating(p)
            | TrainerEvent::Completed(p)
            | TrainerEvent::Failed(p) => Some(&p.job_id),
            TrainerEvent::Notification(_) => None,
        }
    }

    pub fn trainer_id(&self) -> Option<&str> {
        match self {
            TrainerEvent::Generating(p)
            | TrainerEvent::Evaluating(p)
            | TrainerEvent::Completed(p)
            | TrainerEvent::Failed(p) => p.vocab_trainer_id.as_deref(),
            TrainerEvent::Notification(p) => p
                .notification
                .data
                .get("vocabTrainerId")
                .and_then(|v| v.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressPayload {
    pub job_id: String,
    pub user_id: String,
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab_trainer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub notification: Notification,
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub event: TrainerEvent,
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: TrainerEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            created_at: Utc::now(),
        }
    }
}

type SubscriberId = String;

struct Subscriber {
    user_id: Option<String>,
    trainer_id: Option<String>,
    event_types: Option<Vec<String>>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl Subscriber {
    fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(ref user_id) = self.user_id {
            if envelope.event.user_id() != user_id {
                return false;
            }
        }

        if let Some(ref trainer_id) = self.trainer_id {
            if envelope.event.trainer_id() != Some(trainer_id.as_str()) {
                return false;
            }
        }

        if let Some(ref event_types) = self.event_types {
            if !event_types.iter().any(|t| t == envelope.event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filter for [`EventBus::subscribe_filtered`]; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<String>,
    pub trainer_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

pub struct EventBus {
    global_sender: broadcast::Sender<EventEnvelope>,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    event_count: RwLock<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global_sender,
            subscribers: RwLock::new(HashMap::new()),
            event_count: RwLock::new(0),
        }
    }

    pub async fn publish(&self, event: TrainerEvent) {
        let envelope = EventEnvelope::new(event);
        let event_type = envelope.event.event_type();
        let user_id = envelope.event.user_id().to_string();

        {
            let mut count = self.event_count.write().await;
            *count += 1;
        }

        let subscribers = self.subscribers.read().await;
        let mut sent_count = 0usize;

        for subscriber in subscribers.values() {
            if subscriber.matches(&envelope) && subscriber.sender.send(envelope.clone()).is_ok() {
                sent_count += 1;
            }
        }

        if self.global_sender.send(envelope.clone()).is_err() {
            debug!("No global subscribers for event");
        }

        debug!(
            event_type = event_type,
            user_id = user_id,
            sent_to = sent_count,
            "Event published"
        );
    }

    pub fn subscribe_global(&self) -> broadcast::Receiver<EventEnvelope> {
        self.global_sender.subscribe()
    }

    pub async fn subscribe_filtered(
        &self,
        filter: EventFilter,
    ) -> (SubscriberId, broadcast::Receiver<EventEnvelope>) {
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let subscriber_id = uuid::Uuid::new_v4().to_string();

        let subscriber = Subscriber {
            user_id: filter.user_id,
            trainer_id: filter.trainer_id,
            event_types: filter.event_types,
            sender,
        };

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(subscriber_id.clone(), subscriber);
        }

        debug!(subscriber_id = %subscriber_id, "New filtered subscription created");

        (subscriber_id, receiver)
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(subscriber_id).is_some() {
            debug!(subscriber_id = %subscriber_id, "Subscription removed");
        }
    }

    pub async fn event_count(&self) -> u64 {
        *self.event_count.read().await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(user_id: &str, trainer_id: &str) -> JobProgressPayload {
        JobProgressPayload {
            job_id: "job-1".to_string(),
            user_id: user_id.to_string(),
            queue: "multiple-choice-generation".to_string(),
            vocab_trainer_id: Some(trainer_id.to_string()),
            payload: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe_global();

        bus.publish(TrainerEvent::Generating(progress("user1", "t1"))).await;

        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), "generating");
        assert_eq!(envelope.event.user_id(), "user1");
        assert_eq!(envelope.event.job_id(), Some("job-1"));
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let bus = EventBus::new();
        let (sub_id, mut receiver) = bus
            .subscribe_filtered(EventFilter {
                user_id: Some("user1".to_string()),
                trainer_id: None,
                event_types: Some(vec!["completed".to_string()]),
            })
            .await;

        bus.publish(TrainerEvent::Completed(progress("user2", "t2"))).await;
        bus.publish(TrainerEvent::Generating(progress("user1", "t1"))).await;
        bus.publish(TrainerEvent::Completed(progress("user1", "t1"))).await;

        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.event.user_id(), "user1");
        assert_eq!(envelope.event.event_type(), "completed");

        bus.unsubscribe(&sub_id).await;
        assert_eq!(bus.subscribers.read().await.len(), 0);
    }

    #[test]
    fn progress_events_serialize_flat_with_type_tag() {
        let value = serde_json::to_value(TrainerEvent::Failed(progress("u", "t"))).unwrap();
        assert_eq!(value["type"], "failed");
        assert_eq!(value["jobId"], "job-1");
        assert_eq!(value["vocabTrainerId"], "t");
    }
}
