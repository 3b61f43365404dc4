use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::ai::json::parse_model_json;
use crate::ai::{prompts, retry_with_backoff, CompletionError};
use crate::domain::{NewTrainerResult, QuestionType, ResultStatus, Vocab};

use super::AnswerEvaluator;

/// One answer queued for grading, as carried in the evaluation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInBlankEvaluation {
    pub vocab: Vocab,
    pub user_answer: String,
    pub system_answer: String,
    pub question_type: QuestionType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInBlankJudgment {
    pub is_correct: bool,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Identical after trimming, ignoring case.
pub fn is_exact_answer(user_answer: &str, system_answer: &str) -> bool {
    let user = user_answer.trim();
    !user.is_empty() && user.to_lowercase() == system_answer.trim().to_lowercase()
}

impl AnswerEvaluator {
    pub async fn judge_fill_in_blank(
        &self,
        evaluation: &FillInBlankEvaluation,
        user_id: Option<&str>,
    ) -> Result<FillInBlankJudgment, CompletionError> {
        if is_exact_answer(&evaluation.user_answer, &evaluation.system_answer) {
            debug!(vocab_id = %evaluation.vocab.id, "Exact answer, skipping model judgment");
            return Ok(FillInBlankJudgment {
                is_correct: true,
                explanation: Some("Your answer matches the expected answer.".to_string()),
            });
        }
        if evaluation.user_answer.trim().is_empty() {
            return Ok(FillInBlankJudgment {
                is_correct: false,
                explanation: Some("No answer was given.".to_string()),
            });
        }

        let vocab = &evaluation.vocab;
        let (question, answer_language) = if evaluation.system_answer == vocab.text_source {
            (
                vocab.first_target().unwrap_or_default(),
                vocab.source_language_code.as_str(),
            )
        } else {
            (vocab.text_source.as_str(), vocab.target_language_code.as_str())
        };
        let prompt = prompts::fill_in_blank_judgment(
            question,
            &evaluation.system_answer,
            &evaluation.user_answer,
            answer_language,
        );

        retry_with_backoff(&self.retry, "fill-in-blank-evaluation", |_attempt| {
            let prompt = prompt.as_str();
            async move {
                let raw = self.client.generate(prompt, user_id, None).await?;
                parse_model_json::<FillInBlankJudgment>(&raw)
            }
        })
        .await
    }

    pub async fn evaluate_fill_in_blank(
        &self,
        evaluation: &FillInBlankEvaluation,
        user_id: Option<&str>,
    ) -> Result<NewTrainerResult, CompletionError> {
        let judgment = self.judge_fill_in_blank(evaluation, user_id).await?;
        Ok(NewTrainerResult {
            vocab_id: Some(evaluation.vocab.id.clone()),
            status: ResultStatus::from_correct(judgment.is_correct),
            user_selected: evaluation.user_answer.clone(),
            system_selected: evaluation.system_answer.clone(),
            data: json!({ "explanation": judgment.explanation }),
        })
    }
}
