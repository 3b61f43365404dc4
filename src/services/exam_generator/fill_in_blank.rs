use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::warn;

use crate::domain::{Direction, FillInBlankQuestion, Vocab};

/// One prompt per vocab with a random direction and, for vocabs with several
/// translations, a random target text.
pub(super) fn build<R: Rng + ?Sized>(vocabs: &[Vocab], rng: &mut R) -> Vec<FillInBlankQuestion> {
    vocabs
        .iter()
        .filter_map(|vocab| {
            let targets: Vec<&str> = vocab.target_texts().collect();
            let Some(target) = targets.choose(rng).copied() else {
                warn!(vocab_id = %vocab.id, "Vocab has no target text, skipping fill-in-blank question");
                return None;
            };
            let direction = if rng.random_bool(0.5) {
                Direction::SourceToTarget
            } else {
                Direction::TargetToSource
            };
            let (question, correct_answer) = match direction {
                Direction::SourceToTarget => (vocab.text_source.clone(), target.to_string()),
                Direction::TargetToSource => (target.to_string(), vocab.text_source.clone()),
            };
            Some(FillInBlankQuestion {
                vocab_id: vocab.id.clone(),
                direction,
                question,
                correct_answer,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TextTarget;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

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

    #[test]
    fn question_and_answer_are_opposite_sides() {
        let vocabs = vec![vocab("v1", "dog", &["con chó", "chó"]), vocab("v2", "cat", &["con mèo"])];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let questions = build(&vocabs, &mut rng);
            assert_eq!(questions.len(), 2);
            for (q, v) in questions.iter().zip(&vocabs) {
                assert_eq!(q.vocab_id, v.id);
                match q.direction {
                    Direction::SourceToTarget => {
                        assert_eq!(q.question, v.text_source);
                        assert!(v.target_texts().any(|t| t == q.correct_answer));
                    }
                    Direction::TargetToSource => {
                        assert_eq!(q.correct_answer, v.text_source);
                        assert!(v.target_texts().any(|t| t == q.question));
                    }
                }
            }
        }
    }

    #[test]
    fn vocab_without_targets_is_skipped() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(build(&[vocab("v1", "dog", &[])], &mut rng).is_empty());
    }
}
