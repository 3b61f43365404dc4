use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vocab {
    pub id: String,
    pub user_id: String,
    pub text_source: String,
    pub source_language_code: String,
    pub target_language_code: String,
    #[serde(default)]
    pub text_targets: Vec<TextTarget>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTarget {
    pub text_target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grammar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_target: Option<String>,
    #[serde(default)]
    pub examples: Vec<VocabExample>,
}

impl TextTarget {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text_target: text.into(),
            grammar: None,
            explanation_source: None,
            explanation_target: None,
            examples: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabExample {
    pub source: String,
    pub target: String,
}

impl Vocab {
    pub fn target_texts(&self) -> impl Iterator<Item = &str> {
        self.text_targets
            .iter()
            .map(|t| t.text_target.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn first_target(&self) -> Option<&str> {
        self.target_texts().next()
    }

    /// Exact, case-sensitive comparison against the source and every target.
    pub fn matches_text(&self, text: &str) -> bool {
        self.text_source == text || self.target_texts().any(|t| t == text)
    }
}

/// Which side of the vocab is shown as the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    SourceToTarget,
    TargetToSource,
}
