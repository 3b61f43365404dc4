use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Achievement,
    Reminder,
    Learning,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Achievement => "ACHIEVEMENT",
            Self::Reminder => "REMINDER",
            Self::Learning => "LEARNING",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "REMINDER" => Self::Reminder,
            "ACHIEVEMENT" => Self::Achievement,
            _ => Self::Learning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LOW" => Self::Low,
            "HIGH" => Self::High,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    #[serde(default)]
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(input: NewNotification) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: input.user_id,
            notification_type: input.notification_type,
            title: input.title,
            message: input.message,
            priority: input.priority,
            data: input.data,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}
