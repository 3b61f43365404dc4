use serde::{Deserialize, Serialize};

use super::vocab::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    FlipCard,
    FillInTheBlank,
    TranslationAudio,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "MULTIPLE_CHOICE",
            Self::FlipCard => "FLIP_CARD",
            Self::FillInTheBlank => "FILL_IN_THE_BLANK",
            Self::TranslationAudio => "TRANSLATION_AUDIO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "MULTIPLE_CHOICE" => Some(Self::MultipleChoice),
            "FLIP_CARD" => Some(Self::FlipCard),
            "FILL_IN_THE_BLANK" => Some(Self::FillInTheBlank),
            "TRANSLATION_AUDIO" => Some(Self::TranslationAudio),
            _ => None,
        }
    }

    /// Types whose exam content needs a model call and therefore a queue job.
    pub fn requires_generation_job(&self) -> bool {
        matches!(self, Self::MultipleChoice | Self::TranslationAudio)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipleChoiceQuestion {
    pub vocab_id: String,
    pub direction: Direction,
    pub content: String,
    pub options: Vec<ChoiceOption>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInBlankQuestion {
    pub vocab_id: String,
    pub direction: Direction,
    pub question: String,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipCard {
    pub vocab_id: String,
    pub front: Vec<String>,
    pub back: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Generated exam content. The variant always agrees with the owning
/// trainer's `question_type`; decoding goes through [`QuestionAnswers::decode`]
/// so the discriminant never has to be guessed from the JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionAnswers {
    MultipleChoice(Vec<MultipleChoiceQuestion>),
    FillInBlank(Vec<FillInBlankQuestion>),
    FlipCard(Vec<FlipCard>),
    Dialogue(Vec<DialogueTurn>),
}

impl QuestionAnswers {
    pub fn empty(question_type: QuestionType) -> Self {
        match question_type {
            QuestionType::MultipleChoice => Self::MultipleChoice(Vec::new()),
            QuestionType::FillInTheBlank => Self::FillInBlank(Vec::new()),
            QuestionType::FlipCard => Self::FlipCard(Vec::new()),
            QuestionType::TranslationAudio => Self::Dialogue(Vec::new()),
        }
    }

    pub fn question_type(&self) -> QuestionType {
        match self {
            Self::MultipleChoice(_) => QuestionType::MultipleChoice,
            Self::FillInBlank(_) => QuestionType::FillInTheBlank,
            Self::FlipCard(_) => QuestionType::FlipCard,
            Self::Dialogue(_) => QuestionType::TranslationAudio,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::MultipleChoice(v) => v.len(),
            Self::FillInBlank(v) => v.len(),
            Self::FlipCard(v) => v.len(),
            Self::Dialogue(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the stored blob for the given type. `null` and `[]` both
    /// decode to an empty set.
    pub fn decode(
        question_type: QuestionType,
        value: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::empty(question_type));
        }
        let value = value.clone();
        Ok(match question_type {
            QuestionType::MultipleChoice => Self::MultipleChoice(serde_json::from_value(value)?),
            QuestionType::FillInTheBlank => Self::FillInBlank(serde_json::from_value(value)?),
            QuestionType::FlipCard => Self::FlipCard(serde_json::from_value(value)?),
            QuestionType::TranslationAudio => Self::Dialogue(serde_json::from_value(value)?),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let encoded = match self {
            Self::MultipleChoice(v) => serde_json::to_value(v),
            Self::FillInBlank(v) => serde_json::to_value(v),
            Self::FlipCard(v) => serde_json::to_value(v),
            Self::Dialogue(v) => serde_json::to_value(v),
        };
        encoded.unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }
}

impl Serialize for QuestionAnswers {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::MultipleChoice(v) => v.serialize(serializer),
            Self::FillInBlank(v) => v.serialize(serializer),
            Self::FlipCard(v) => v.serialize(serializer),
            Self::Dialogue(v) => v.serialize(serializer),
        }
    }
}
