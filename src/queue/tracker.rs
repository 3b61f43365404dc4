use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Progress snapshot of one job, readable by id until it expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub name: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn queued(job: &JobEnvelope) -> Self {
        Self {
            id: job.id.clone(),
            queue: job.queue.clone(),
            name: job.name.clone(),
            state: JobState::Queued,
            user_id: job.user_id().map(str::to_string),
            entity_id: job.entity_id().map(str::to_string),
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            error: None,
            result: None,
            created_at: job.enqueued_at,
            updated_at: Utc::now(),
        }
    }

    pub fn transition(&mut self, state: JobState, attempts_made: u32) {
        self.state = state;
        self.attempts_made = attempts_made;
        self.updated_at = Utc::now();
    }
}
