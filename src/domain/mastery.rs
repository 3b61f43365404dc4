use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_MASTERY_SCORE: i32 = 0;
pub const MAX_MASTERY_SCORE: i32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabMastery {
    pub id: String,
    pub vocab_id: String,
    pub user_id: String,
    pub mastery_score: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VocabMastery {
    pub fn new(vocab_id: &str, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vocab_id: vocab_id.to_string(),
            user_id: user_id.to_string(),
            mastery_score: MIN_MASTERY_SCORE,
            correct_count: 0,
            incorrect_count: 0,
            last_reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies one grading event in place.
    pub fn record(&mut self, is_correct: bool, at: DateTime<Utc>) {
        self.mastery_score = next_score(self.mastery_score, is_correct);
        if is_correct {
            self.correct_count += 1;
        } else {
            self.incorrect_count += 1;
        }
        self.last_reviewed_at = Some(at);
        self.updated_at = at;
    }
}

/// ±1 saturating at the bounds.
pub fn next_score(score: i32, is_correct: bool) -> i32 {
    let delta = if is_correct { 1 } else { -1 };
    (score + delta).clamp(MIN_MASTERY_SCORE, MAX_MASTERY_SCORE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryHistoryEntry {
    pub id: String,
    pub mastery_id: String,
    pub vocab_id: String,
    pub user_id: String,
    pub mastery_score: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub created_at: DateTime<Utc>,
}

impl MasteryHistoryEntry {
    pub fn snapshot(mastery: &VocabMastery) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mastery_id: mastery.id.clone(),
            vocab_id: mastery.vocab_id.clone(),
            user_id: mastery.user_id.clone(),
            mastery_score: mastery.mastery_score,
            correct_count: mastery.correct_count,
            incorrect_count: mastery.incorrect_count,
            created_at: mastery.updated_at,
        }
    }
}
