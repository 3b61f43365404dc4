mod dialogue;
mod fill_in_blank;
mod flip_card;
mod multiple_choice;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ai::{CompletionClient, RetryPolicy};
use crate::config::TrainerSettings;
use crate::domain::{
    DialogueTurn, FillInBlankQuestion, FlipCard, MultipleChoiceQuestion, QuestionAnswers,
    QuestionType, Vocab,
};
use crate::services::app_config::{
    resolve_parsed, ConfigResolver, KEY_QUESTION_COUNT, KEY_SOURCE_TO_TARGET_PROBABILITY,
};

use super::error::ServiceError;

pub use dialogue::{dialogue_words, validate_dialogue, DIALOGUE_TURNS};
pub use multiple_choice::normalize_options;

/// Builds exam content per question type. Types that need the model
/// (multiple choice, dialogue) are async and are driven by queue workers;
/// the rest are built inline.
pub struct ExamGenerator {
    client: Arc<dyn CompletionClient>,
    resolver: Arc<dyn ConfigResolver>,
    retry: RetryPolicy,
    settings: TrainerSettings,
    rng: Mutex<StdRng>,
}

impl ExamGenerator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        resolver: Arc<dyn ConfigResolver>,
        retry: RetryPolicy,
        settings: TrainerSettings,
    ) -> Self {
        Self::with_rng(client, resolver, retry, settings, StdRng::from_os_rng())
    }

    pub fn with_rng(
        client: Arc<dyn CompletionClient>,
        resolver: Arc<dyn ConfigResolver>,
        retry: RetryPolicy,
        settings: TrainerSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            client,
            resolver,
            retry,
            settings,
            rng: Mutex::new(rng),
        }
    }

    /// Content that can be built without a model call, or `None` for types
    /// that go through a generation job.
    pub fn build_inline(&self, question_type: QuestionType, vocabs: &[Vocab]) -> Option<QuestionAnswers> {
        match question_type {
            QuestionType::FillInTheBlank => Some(QuestionAnswers::FillInBlank(self.fill_in_blank(vocabs))),
            QuestionType::FlipCard => Some(QuestionAnswers::FlipCard(self.flip_cards(vocabs))),
            QuestionType::MultipleChoice | QuestionType::TranslationAudio => None,
        }
    }

    pub fn fill_in_blank(&self, vocabs: &[Vocab]) -> Vec<FillInBlankQuestion> {
        let mut rng = self.rng.lock();
        fill_in_blank::build(vocabs, &mut *rng)
    }

    pub fn flip_cards(&self, vocabs: &[Vocab]) -> Vec<FlipCard> {
        let mut rng = self.rng.lock();
        flip_card::build(vocabs, &mut *rng)
    }

    /// One question per vocab; a vocab whose generation still fails after
    /// retries is left out.
    pub async fn multiple_choice(&self, vocabs: &[Vocab], user_id: Option<&str>) -> Vec<MultipleChoiceQuestion> {
        let question_count = resolve_parsed::<usize>(self.resolver.as_ref(), user_id, KEY_QUESTION_COUNT)
            .await
            .filter(|n| *n >= 2)
            .unwrap_or(self.settings.question_count);
        let probability = resolve_parsed::<f64>(self.resolver.as_ref(), user_id, KEY_SOURCE_TO_TARGET_PROBABILITY)
            .await
            .filter(|p| (0.0..=1.0).contains(p))
            .unwrap_or(self.settings.source_to_target_probability);

        multiple_choice::generate(self, vocabs, user_id, question_count, probability).await
    }

    pub async fn dialogue(&self, vocabs: &[Vocab], user_id: Option<&str>) -> Result<Vec<DialogueTurn>, ServiceError> {
        dialogue::generate(self, vocabs, user_id).await
    }
}
