use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ai::json::parse_model_json;
use crate::ai::{prompts, retry_with_backoff, transcribe, AudioAttachment, CompletionError};

use super::AnswerEvaluator;

const WEIGHT_ACCURACY: f64 = 2.5;
const WEIGHT_FLUENCY: f64 = 2.0;
const WEIGHT_REGISTER: f64 = 1.5;
const WEIGHT_COMPLETENESS: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricScores {
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub fluency: f64,
    #[serde(default)]
    pub register: f64,
    #[serde(default)]
    pub completeness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationErrorItem {
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub span: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvaluation {
    #[serde(default)]
    overall_score: Option<f64>,
    #[serde(default)]
    meaning_coverage: Option<f64>,
    #[serde(default)]
    scores: RubricScores,
    #[serde(default)]
    errors: Vec<TranslationErrorItem>,
    #[serde(default)]
    missing_ideas: Vec<String>,
    #[serde(default)]
    corrected_translation: String,
    #[serde(default)]
    advice: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationEvaluation {
    pub transcript: String,
    pub overall_score: f64,
    /// The model's own summary number, kept for reference only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_overall_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning_coverage: Option<f64>,
    pub scores: RubricScores,
    pub errors: Vec<TranslationErrorItem>,
    pub missing_ideas: Vec<String>,
    pub corrected_translation: String,
    pub advice: Vec<String>,
}

fn clamp_sub_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 10.0)
    } else {
        0.0
    }
}

/// Recomputes the overall score from the rubric:
/// `accuracy*2.5 + fluency*2 + register*1.5 + completeness*4`, with every
/// sub-score clamped to 0..=10, completeness taken from the coverage
/// percentage when present, and the total clamped to 0..=100.
pub fn score_translation(scores: RubricScores, meaning_coverage: Option<f64>) -> (RubricScores, f64) {
    let completeness = match meaning_coverage.filter(|c| c.is_finite()) {
        Some(coverage) => coverage.clamp(0.0, 100.0) / 10.0,
        None => scores.completeness,
    };
    let scores = RubricScores {
        accuracy: clamp_sub_score(scores.accuracy),
        fluency: clamp_sub_score(scores.fluency),
        register: clamp_sub_score(scores.register),
        completeness: clamp_sub_score(completeness),
    };
    let overall = scores.accuracy * WEIGHT_ACCURACY
        + scores.fluency * WEIGHT_FLUENCY
        + scores.register * WEIGHT_REGISTER
        + scores.completeness * WEIGHT_COMPLETENESS;
    (scores, overall.clamp(0.0, 100.0))
}

impl AnswerEvaluator {
    /// Transcribes the spoken translation, then grades it against `original`.
    /// Both calls retry independently.
    pub async fn evaluate_translation_audio(
        &self,
        audio: &AudioAttachment,
        original: &str,
        source_language: &str,
        target_language: &str,
        user_id: Option<&str>,
    ) -> Result<TranslationEvaluation, CompletionError> {
        let client = self.client.as_ref();
        let transcript = retry_with_backoff(&self.retry, "audio-transcription", |_attempt| {
            transcribe(client, audio, target_language, user_id)
        })
        .await?;

        let prompt = prompts::translation_evaluation(original, &transcript, source_language, target_language);
        let raw = retry_with_backoff(&self.retry, "translation-evaluation", |_attempt| {
            let prompt = prompt.as_str();
            async move {
                let raw = client.generate(prompt, user_id, None).await?;
                parse_model_json::<RawEvaluation>(&raw)
            }
        })
        .await?;

        let (scores, overall_score) = score_translation(raw.scores, raw.meaning_coverage);
        info!(
            overall_score,
            model_overall_score = ?raw.overall_score,
            "Translation evaluated"
        );

        Ok(TranslationEvaluation {
            transcript,
            overall_score,
            model_overall_score: raw.overall_score,
            meaning_coverage: raw.meaning_coverage,
            scores,
            errors: raw.errors,
            missing_ideas: raw.missing_ideas,
            corrected_translation: raw.corrected_translation,
            advice: raw.advice,
        })
    }
}
