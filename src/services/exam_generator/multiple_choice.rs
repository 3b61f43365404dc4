use futures_util::future::join_all;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ai::json::parse_model_json;
use crate::ai::{prompts, retry_with_backoff, CompletionError};
use crate::domain::{ChoiceOption, Direction, MultipleChoiceQuestion, Vocab};

use super::ExamGenerator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuestion {
    #[serde(default)]
    options: Vec<GeneratedOption>,
    #[serde(default)]
    correct_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedOption {
    label: String,
    #[serde(default)]
    value: Option<String>,
}

struct Plan<'a> {
    vocab: &'a Vocab,
    direction: Direction,
    content: String,
    correct_answer: String,
}

pub(super) async fn generate(
    generator: &ExamGenerator,
    vocabs: &[Vocab],
    user_id: Option<&str>,
    question_count: usize,
    source_to_target_probability: f64,
) -> Vec<MultipleChoiceQuestion> {
    let plans: Vec<Plan<'_>> = {
        let mut rng = generator.rng.lock();
        vocabs
            .iter()
            .filter_map(|vocab| plan(vocab, source_to_target_probability, &mut *rng))
            .collect()
    };

    let generated = join_all(
        plans
            .iter()
            .map(|plan| generate_options(generator, plan, user_id, question_count)),
    )
    .await;

    let mut questions = Vec::with_capacity(plans.len());
    for (plan, options) in plans.into_iter().zip(generated) {
        match options {
            Ok(mut options) => {
                options.shuffle(&mut *generator.rng.lock());
                questions.push(MultipleChoiceQuestion {
                    vocab_id: plan.vocab.id.clone(),
                    direction: plan.direction,
                    content: plan.content,
                    options,
                    correct_answer: plan.correct_answer,
                });
            }
            Err(e) => warn!(
                vocab_id = %plan.vocab.id,
                category = e.category(),
                error = %e,
                "Multiple-choice generation failed, omitting vocab"
            ),
        }
    }

    debug!(requested = vocabs.len(), generated = questions.len(), "Multiple-choice batch generated");
    questions
}

fn plan<'a, R: Rng + ?Sized>(vocab: &'a Vocab, probability: f64, rng: &mut R) -> Option<Plan<'a>> {
    let targets: Vec<&str> = vocab.target_texts().collect();
    let Some(target) = targets.choose(rng).copied() else {
        warn!(vocab_id = %vocab.id, "Vocab has no target text, skipping multiple-choice question");
        return None;
    };
    let direction = if rng.random_bool(probability.clamp(0.0, 1.0)) {
        Direction::SourceToTarget
    } else {
        Direction::TargetToSource
    };
    let (content, correct_answer) = match direction {
        Direction::SourceToTarget => (vocab.text_source.clone(), target.to_string()),
        Direction::TargetToSource => (target.to_string(), vocab.text_source.clone()),
    };
    Some(Plan {
        vocab,
        direction,
        content,
        correct_answer,
    })
}

async fn generate_options(
    generator: &ExamGenerator,
    plan: &Plan<'_>,
    user_id: Option<&str>,
    question_count: usize,
) -> Result<Vec<ChoiceOption>, CompletionError> {
    let prompt = prompts::multiple_choice(
        plan.vocab,
        plan.direction,
        &plan.content,
        &plan.correct_answer,
        question_count,
    );
    retry_with_backoff(&generator.retry, "multiple-choice-generation", |_attempt| {
        let prompt = prompt.as_str();
        async move {
            let raw = generator.client.generate(prompt, user_id, None).await?;
            let generated: GeneratedQuestion = parse_model_json(&raw)?;
            if let Some(model_answer) = generated.correct_answer.as_deref() {
                if !same_text(model_answer, &plan.correct_answer) {
                    debug!(
                        vocab_id = %plan.vocab.id,
                        model_answer,
                        "Model changed the correct answer, keeping the vocab's own"
                    );
                }
            }
            let labels = generated
                .options
                .into_iter()
                .map(|o| if o.label.trim().is_empty() { o.value.unwrap_or_default() } else { o.label })
                .collect::<Vec<_>>();
            normalize_options(&labels, &plan.correct_answer, question_count)
        }
    })
    .await
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Exactly `count` distinct options: the expected answer once plus the first
/// `count - 1` distinct distractors the model offered. Too few distractors is
/// a parse failure so the caller retries.
pub fn normalize_options(
    labels: &[String],
    correct_answer: &str,
    count: usize,
) -> Result<Vec<ChoiceOption>, CompletionError> {
    let wanted = count.saturating_sub(1);
    let mut seen: Vec<String> = vec![correct_answer.trim().to_lowercase()];
    let mut options = vec![ChoiceOption {
        label: correct_answer.to_string(),
        value: correct_answer.to_string(),
    }];

    for label in labels {
        if options.len() > wanted {
            break;
        }
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let key = label.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        options.push(ChoiceOption {
            label: label.to_string(),
            value: label.to_string(),
        });
    }

    if options.len() != count {
        return Err(CompletionError::Parse(format!(
            "expected {} distractors, model offered {}",
            wanted,
            options.len() - 1
        )));
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_answer_once_and_dedupes() {
        let options = normalize_options(
            &labels(&["Xin chào", "tạm biệt", "cảm ơn", "tạm biệt", "xin lỗi", "vâng"]),
            "xin chào",
            4,
        )
        .unwrap();
        let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["xin chào", "tạm biệt", "cảm ơn", "xin lỗi"]);
    }

    #[test]
    fn too_few_distractors_is_retryable() {
        let err = normalize_options(&labels(&["a", "b"]), "c", 4).unwrap_err();
        assert!(matches!(err, CompletionError::Parse(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn answer_missing_from_model_output_is_inserted() {
        let options = normalize_options(&labels(&["one", "two", "three"]), "four", 4).unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options.iter().filter(|o| o.value == "four").count(), 1);
    }
}
