use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::{QuestionAnswers, QuestionType};
use super::vocab::Vocab;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainerStatus {
    Pending,
    Passed,
    Failed,
}

impl TrainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "PASSED" => Self::Passed,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Passed,
    Failed,
}

impl ResultStatus {
    pub fn from_correct(is_correct: bool) -> Self {
        if is_correct {
            Self::Passed
        } else {
            Self::Failed
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("PASSED") {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerResult {
    pub id: String,
    pub trainer_id: String,
    pub vocab_id: Option<String>,
    pub status: ResultStatus,
    pub user_selected: String,
    pub system_selected: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A result row before persistence assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrainerResult {
    pub vocab_id: Option<String>,
    pub status: ResultStatus,
    pub user_selected: String,
    pub system_selected: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NewTrainerResult {
    pub fn is_passed(&self) -> bool {
        self.status.is_passed()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trainer {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub question_type: QuestionType,
    pub status: TrainerStatus,
    pub question_answers: QuestionAnswers,
    pub count_time: i32,
    pub set_count_time: i32,
    pub reminder_repeat: i32,
    pub reminder_last_remind: Option<DateTime<Utc>>,
    pub reminder_disabled: bool,
    pub vocabs: Vec<Vocab>,
    pub results: Vec<TrainerResult>,
    /// Bumped on every successful update; writes carrying a stale value are
    /// rejected.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trainer {
    pub fn vocab(&self, vocab_id: &str) -> Option<&Vocab> {
        self.vocabs.iter().find(|v| v.id == vocab_id)
    }

    pub fn vocab_ids(&self) -> Vec<String> {
        self.vocabs.iter().map(|v| v.id.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewTrainer {
    pub user_id: String,
    pub name: String,
    pub question_type: QuestionType,
    pub set_count_time: i32,
    pub vocab_ids: Vec<String>,
}
