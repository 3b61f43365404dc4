use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::domain::{MultipleChoiceQuestion, NewTrainerResult, ResultStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipleChoiceAnswer {
    pub user_selected: String,
    /// The correct answer as the client saw it; used to locate the question.
    #[serde(default)]
    pub system_selected: Option<String>,
    #[serde(default)]
    pub vocab_id: Option<String>,
}

/// Grades each answer against the stored question it belongs to. The stored
/// correct answer is authoritative; a client-sent `systemSelected` only
/// locates the question. Each question is graded at most once and answers
/// that match no question are skipped.
pub fn evaluate_multiple_choice(
    questions: &[MultipleChoiceQuestion],
    answers: &[MultipleChoiceAnswer],
) -> Vec<NewTrainerResult> {
    let mut by_vocab: HashMap<&str, usize> = HashMap::new();
    let mut by_correct: HashMap<&str, usize> = HashMap::new();
    let mut by_option: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, question) in questions.iter().enumerate() {
        by_vocab.entry(question.vocab_id.as_str()).or_insert(index);
        by_correct.entry(question.correct_answer.as_str()).or_insert(index);
        for option in &question.options {
            by_option.entry(option.value.as_str()).or_default().push(index);
        }
    }

    let mut graded: HashSet<usize> = HashSet::new();
    let mut results = Vec::new();

    for answer in answers {
        let located = answer
            .vocab_id
            .as_deref()
            .and_then(|id| by_vocab.get(id).copied())
            .or_else(|| {
                answer
                    .system_selected
                    .as_deref()
                    .and_then(|s| by_correct.get(s).copied())
            })
            .or_else(|| {
                answer
                    .system_selected
                    .as_deref()
                    .and_then(|s| by_option.get(s))
                    .and_then(|candidates| candidates.iter().copied().find(|i| !graded.contains(i)))
            })
            .or_else(|| {
                by_option
                    .get(answer.user_selected.as_str())
                    .and_then(|candidates| candidates.iter().copied().find(|i| !graded.contains(i)))
            });

        let Some(index) = located else {
            warn!(user_selected = %answer.user_selected, "Answer matches no question, skipping");
            continue;
        };
        if !graded.insert(index) {
            warn!(vocab_id = %questions[index].vocab_id, "Question answered twice, keeping first answer");
            continue;
        }

        let question = &questions[index];
        results.push(NewTrainerResult {
            vocab_id: Some(question.vocab_id.clone()),
            status: ResultStatus::from_correct(answer.user_selected == question.correct_answer),
            user_selected: answer.user_selected.clone(),
            system_selected: question.correct_answer.clone(),
            data: json!({
                "content": question.content,
                "direction": question.direction,
            }),
        });
    }

    results
}
