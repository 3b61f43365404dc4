use crate::domain::{Direction, Vocab};

const JSON_ONLY: &str = "Respond with strict JSON only. Do not wrap the JSON in Markdown code fences \
and do not add any text before or after it.";

pub fn multiple_choice(
    vocab: &Vocab,
    direction: Direction,
    content: &str,
    correct_answer: &str,
    option_count: usize,
) -> String {
    let (question_lang, answer_lang) = match direction {
        Direction::SourceToTarget => (&vocab.source_language_code, &vocab.target_language_code),
        Direction::TargetToSource => (&vocab.target_language_code, &vocab.source_language_code),
    };
    format!(
        "You write vocabulary quiz questions.\n\
Question word ({question_lang}): \"{content}\"\n\
Correct translation ({answer_lang}): \"{correct_answer}\"\n\
Produce exactly {option_count} answer options in {answer_lang}: the correct translation exactly as given \
and {distractors} plausible but wrong distractors of similar length and register. \
Every option needs a \"label\" (text shown to the learner) and a \"value\" (identical to the label).\n\
{JSON_ONLY}\n\
Schema: {{\"content\": string, \"options\": [{{\"label\": string, \"value\": string}}], \"correctAnswer\": string}}",
        distractors = option_count.saturating_sub(1),
    )
}

pub fn fill_in_blank_judgment(
    question: &str,
    system_answer: &str,
    user_answer: &str,
    answer_language: &str,
) -> String {
    format!(
        "You grade a vocabulary exercise.\n\
Prompt shown to the learner: \"{question}\"\n\
Expected answer ({answer_language}): \"{system_answer}\"\n\
Learner answer: \"{user_answer}\"\n\
Accept synonyms, minor spelling slips and equivalent phrasing that keeps the meaning. \
Reject answers with a different meaning or in the wrong language.\n\
{JSON_ONLY}\n\
Schema: {{\"isCorrect\": boolean, \"explanation\": string}}"
    )
}

pub fn dialogue(words: &[String], source_language: &str, target_language: &str) -> String {
    let list = words
        .iter()
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Write a short natural dialogue in {source_language} between two speakers, A and B, for a learner of \
{target_language}. It must have exactly 4 lines alternating A, B, A, B. Use every one of these words \
at least once, spelled exactly as given: {list}.\n\
{JSON_ONLY}\n\
Schema: {{\"dialogue\": [{{\"speaker\": \"A\" | \"B\", \"text\": string}}]}}"
    )
}

pub fn translation_evaluation(
    original: &str,
    transcript: &str,
    source_language: &str,
    target_language: &str,
) -> String {
    format!(
        "You assess a spoken translation.\n\
Original text ({source_language}):\n{original}\n\
Learner's spoken translation into {target_language} (transcribed):\n{transcript}\n\
Score accuracy, fluency, register and completeness from 0 to 10 each, and estimate the percentage of the \
original meaning that is conveyed (meaningCoverage, 0-100). List concrete errors with the offending span, \
ideas that are missing, a corrected translation and short advice.\n\
{JSON_ONLY}\n\
Schema: {{\"overallScore\": number, \"meaningCoverage\": number, \
\"scores\": {{\"accuracy\": number, \"fluency\": number, \"register\": number, \"completeness\": number}}, \
\"errors\": [{{\"index\": number, \"span\": string, \"type\": string, \"explanation\": string, \"suggestion\": string}}], \
\"missingIdeas\": [string], \"correctedTranslation\": string, \"advice\": [string]}}"
    )
}

pub fn vocab_translation(text: &str, source_language: &str, target_language: &str) -> String {
    format!(
        "Translate the {source_language} vocabulary item \"{text}\" into {target_language}. \
Give up to 3 common translations, most common first, with a one-line usage note each.\n\
{JSON_ONLY}\n\
Schema: {{\"translations\": [{{\"textTarget\": string, \"explanation\": string}}]}}"
    )
}
