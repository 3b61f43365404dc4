use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{QuestionType, Vocab};
use crate::services::evaluator::FillInBlankEvaluation;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInBlankAnswer {
    #[serde(default)]
    pub user_answer: String,
    pub system_answer: String,
}

/// Pairs each answer with the vocab whose source or a target equals its
/// `system_answer` exactly. The first vocab in assignment order wins when
/// two share a text. Answers matching no vocab are logged and dropped.
pub fn match_answers(
    trainer_id: &str,
    vocabs: &[Vocab],
    answers: &[FillInBlankAnswer],
) -> Vec<FillInBlankEvaluation> {
    answers
        .iter()
        .filter_map(|answer| {
            let Some(vocab) = vocabs.iter().find(|v| v.matches_text(&answer.system_answer)) else {
                warn!(
                    trainer_id,
                    system_answer = %answer.system_answer,
                    "Submitted answer matches no assigned vocab, skipping"
                );
                return None;
            };
            Some(FillInBlankEvaluation {
                vocab: vocab.clone(),
                user_answer: answer.user_answer.clone(),
                system_answer: answer.system_answer.clone(),
                question_type: QuestionType::FillInTheBlank,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TextTarget;
    use chrono::Utc;

    fn vocab(id: &str, source: &str, targets: &[&str]) -> Vocab {
        Vocab {
            id: id.to_string(),
            user_id: "u1".to_string(),
            text_source: source.to_string(),
            source_language_code: "en".to_string(),
            target_language_code: "vi".to_string(),
            text_targets: targets.iter().map(|t| TextTarget::plain(*t)).collect(),
            created_at: Utc::now(),
        }
    }

    fn answer(user: &str, system: &str) -> FillInBlankAnswer {
        FillInBlankAnswer {
            user_answer: user.to_string(),
            system_answer: system.to_string(),
        }
    }

    #[test]
    fn matches_source_and_target_exactly() {
        let vocabs = vec![vocab("v1", "hello", &["xin chào"]), vocab("v2", "cat", &["con mèo"])];
        let matched = match_answers(
            "t1",
            &vocabs,
            &[answer("xin chao", "xin chào"), answer("cat", "cat"), answer("x", "Cat")],
        );
        let ids: Vec<&str> = matched.iter().map(|e| e.vocab.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
        assert_eq!(matched[0].user_answer, "xin chao");
    }

    #[test]
    fn shared_text_goes_to_first_vocab() {
        let vocabs = vec![vocab("v1", "bank", &["ngân hàng"]), vocab("v2", "bank", &["bờ sông"])];
        let matched = match_answers("t1", &vocabs, &[answer("a", "bank")]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].vocab.id, "v1");
    }
}
