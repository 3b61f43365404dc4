use serde::Deserialize;
use tracing::info;

use crate::ai::json::parse_model_json;
use crate::ai::{prompts, retry_with_backoff, CompletionError};
use crate::domain::{DialogueTurn, Speaker, Vocab};
use crate::services::error::ServiceError;

use super::ExamGenerator;

pub const DIALOGUE_TURNS: usize = 4;

#[derive(Debug, Deserialize)]
struct GeneratedDialogue {
    #[serde(default)]
    dialogue: Vec<GeneratedTurn>,
}

#[derive(Debug, Deserialize)]
struct GeneratedTurn {
    speaker: String,
    text: String,
}

/// Distinct source words of the trainer, first occurrence wins.
pub fn dialogue_words(vocabs: &[Vocab]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    for vocab in vocabs {
        let word = vocab.text_source.trim();
        let key = word.to_lowercase();
        if word.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        words.push(word.to_string());
    }
    words
}

/// Exactly four turns alternating A, B, A, B, and every word appears
/// (case-insensitive substring) somewhere in the text.
pub fn validate_dialogue(turns: &[DialogueTurn], words: &[String]) -> Result<(), String> {
    if turns.len() != DIALOGUE_TURNS {
        return Err(format!("expected {DIALOGUE_TURNS} turns, got {}", turns.len()));
    }
    for (index, turn) in turns.iter().enumerate() {
        let expected = if index % 2 == 0 { Speaker::A } else { Speaker::B };
        if turn.speaker != expected {
            return Err(format!("turn {} should be spoken by {:?}", index + 1, expected));
        }
        if turn.text.trim().is_empty() {
            return Err(format!("turn {} is empty", index + 1));
        }
    }
    let text = turns
        .iter()
        .map(|t| t.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let missing: Vec<&str> = words
        .iter()
        .filter(|w| !text.contains(&w.to_lowercase()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing words: {}", missing.join(", ")));
    }
    Ok(())
}

fn to_turns(generated: GeneratedDialogue) -> Result<Vec<DialogueTurn>, String> {
    generated
        .dialogue
        .into_iter()
        .map(|turn| {
            let speaker = match turn.speaker.trim().to_uppercase().as_str() {
                "A" => Speaker::A,
                "B" => Speaker::B,
                other => return Err(format!("unknown speaker {other:?}")),
            };
            Ok(DialogueTurn {
                speaker,
                text: turn.text.trim().to_string(),
            })
        })
        .collect()
}

pub(super) async fn generate(
    generator: &ExamGenerator,
    vocabs: &[Vocab],
    user_id: Option<&str>,
) -> Result<Vec<DialogueTurn>, ServiceError> {
    let words = dialogue_words(vocabs);
    if words.is_empty() {
        return Ok(Vec::new());
    }
    let Some(first) = vocabs.first() else {
        return Ok(Vec::new());
    };

    let prompt = prompts::dialogue(&words, &first.source_language_code, &first.target_language_code);
    let turns = retry_with_backoff(&generator.retry, "dialogue-generation", |_attempt| {
        let (prompt, words) = (prompt.as_str(), words.as_slice());
        async move {
            let raw = generator.client.generate(prompt, user_id, None).await?;
            let generated: GeneratedDialogue = parse_model_json(&raw)?;
            let turns = to_turns(generated).map_err(CompletionError::Parse)?;
            validate_dialogue(&turns, words).map_err(CompletionError::Parse)?;
            Ok(turns)
        }
    })
    .await?;

    info!(words = words.len(), "Dialogue generated");
    Ok(turns)
}
