mod fill_in_blank;
mod multiple_choice;
mod translation;

use std::sync::Arc;

use crate::ai::{CompletionClient, RetryPolicy};

pub use fill_in_blank::{is_exact_answer, FillInBlankEvaluation, FillInBlankJudgment};
pub use multiple_choice::{evaluate_multiple_choice, MultipleChoiceAnswer};
pub use translation::{
    score_translation, RubricScores, TranslationErrorItem, TranslationEvaluation,
};

/// Grades submitted answers. Multiple choice is a pure comparison; the
/// free-form types go through the completion client with bounded retry.
pub struct AnswerEvaluator {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
}

impl AnswerEvaluator {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}
