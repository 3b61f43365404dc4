mod grading;
pub mod matching;
pub mod state_machine;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainerSettings;
use crate::db::{RepositoryError, TrainerRepository, VocabRepository};
use crate::domain::{NewTrainer, QuestionAnswers, QuestionType, Trainer, Vocab};
use crate::queue::{EnqueueOptions, JobQueue, DIALOGUE_GENERATION, MULTIPLE_CHOICE_GENERATION};

use super::error::ServiceError;
use super::evaluator::AnswerEvaluator;
use super::exam_generator::ExamGenerator;
use super::mastery::MasteryTracker;
use super::notification::ReminderDispatcher;

pub use grading::{
    AudioEvaluationJobPayload, FillInBlankJobPayload, GradingOutcome, SubmitFillInBlankInput,
    SubmitMultipleChoiceInput, SubmitTranslationAudioInput,
};
pub use matching::{match_answers, FillInBlankAnswer};
pub use state_machine::{
    decide, fail_unanswered, next_reminder, score_results, status_for_score, Transition,
};

/// Attempts at a version-checked write before giving up with a conflict.
const WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrainerInput {
    pub name: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub set_count_time: Option<i32>,
    pub vocab_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrainerInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub set_count_time: Option<i32>,
    #[serde(default)]
    pub reminder_disabled: Option<bool>,
    /// Replaces the assigned vocabs and clears generated content.
    #[serde(default)]
    pub vocab_ids: Option<Vec<String>>,
    /// Version the client last read; a mismatch is a conflict.
    #[serde(default)]
    pub version: Option<i64>,
}

/// Payload of both generation queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJobPayload {
    pub vocab_trainer_id: String,
    pub vocab_list: Vec<Vocab>,
    pub user_id: String,
    /// Trainer version the vocab list was read at.
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResponse {
    pub vocab_trainer_id: String,
    pub question_type: QuestionType,
    pub question_answers: QuestionAnswers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Collaborators shared by every trainer operation.
pub struct TrainerServiceDeps {
    pub trainers: Arc<dyn TrainerRepository>,
    pub vocabs: Arc<dyn VocabRepository>,
    pub generator: Arc<ExamGenerator>,
    pub evaluator: Arc<AnswerEvaluator>,
    pub mastery: Arc<MasteryTracker>,
    pub dispatcher: Arc<ReminderDispatcher>,
    pub queue: Arc<JobQueue>,
    pub settings: TrainerSettings,
}

/// Owns the trainer lifecycle: CRUD, exam fetch, submissions and the
/// write-backs performed by queue workers.
pub struct TrainerService {
    trainers: Arc<dyn TrainerRepository>,
    vocabs: Arc<dyn VocabRepository>,
    generator: Arc<ExamGenerator>,
    evaluator: Arc<AnswerEvaluator>,
    mastery: Arc<MasteryTracker>,
    dispatcher: Arc<ReminderDispatcher>,
    queue: Arc<JobQueue>,
    settings: TrainerSettings,
}

impl TrainerService {
    pub fn new(deps: TrainerServiceDeps) -> Self {
        Self {
            trainers: deps.trainers,
            vocabs: deps.vocabs,
            generator: deps.generator,
            evaluator: deps.evaluator,
            mastery: deps.mastery,
            dispatcher: deps.dispatcher,
            queue: deps.queue,
            settings: deps.settings,
        }
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    pub async fn create(&self, user_id: &str, input: CreateTrainerInput) -> Result<Trainer, ServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("name is required"));
        }
        let vocab_ids = self.owned_vocab_ids(user_id, &input.vocab_ids).await?;

        let trainer = self
            .trainers
            .create(NewTrainer {
                user_id: user_id.to_string(),
                name: name.to_string(),
                question_type: input.question_type,
                set_count_time: input.set_count_time.unwrap_or(0).max(0),
                vocab_ids,
            })
            .await?;
        info!(
            trainer_id = %trainer.id,
            user_id,
            question_type = trainer.question_type.as_str(),
            vocab_count = trainer.vocabs.len(),
            "Trainer created"
        );
        Ok(trainer)
    }

    pub async fn find_one(&self, id: &str, user_id: &str) -> Result<Trainer, ServiceError> {
        match self.trainers.find_by_id(id).await? {
            Some(trainer) if trainer.user_id == user_id => Ok(trainer),
            _ => Err(ServiceError::not_found(format!("vocab trainer {id}"))),
        }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Trainer>, ServiceError> {
        Ok(self.trainers.list_by_user(user_id).await?)
    }

    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        input: UpdateTrainerInput,
    ) -> Result<Trainer, ServiceError> {
        let mut trainer = self.find_one(id, user_id).await?;
        if let Some(expected) = input.version {
            if expected != trainer.version {
                return Err(ServiceError::Conflict(format!(
                    "vocab trainer {id} was modified (version {} != {expected})",
                    trainer.version
                )));
            }
        }
        let name = match input.name.as_deref().map(str::trim) {
            Some("") => return Err(ServiceError::validation("name must not be empty")),
            other => other,
        };

        let reassigned = match input.vocab_ids.as_deref() {
            Some(ids) => Some(self.owned_vocab_ids(user_id, ids).await?),
            None => None,
        };
        if let Some(ids) = reassigned.as_deref() {
            // Vocabs first: content generated for the old set is rejected by
            // `store_generated` from here on, and the clear below wins over
            // any that landed before.
            self.trainers.set_vocabs(id, ids).await?;
            debug!(trainer_id = id, vocab_count = ids.len(), "Trainer vocabs reassigned");
        }

        for attempt in 1..=WRITE_ATTEMPTS {
            if let Some(name) = name {
                trainer.name = name.to_string();
            }
            if let Some(seconds) = input.set_count_time {
                trainer.set_count_time = seconds.max(0);
            }
            if let Some(disabled) = input.reminder_disabled {
                trainer.reminder_disabled = disabled;
            }
            if reassigned.is_some() {
                trainer.question_answers = QuestionAnswers::empty(trainer.question_type);
            }

            match self.trainers.update(&trainer).await {
                Ok(updated) if reassigned.is_some() => {
                    info!(trainer_id = id, version = updated.version, "Trainer content cleared after reassignment");
                    return self.find_one(id, user_id).await;
                }
                Ok(updated) => return Ok(updated),
                Err(RepositoryError::Conflict { .. }) if reassigned.is_some() && attempt < WRITE_ATTEMPTS => {
                    debug!(trainer_id = id, attempt, "Version conflict during reassignment, re-reading");
                    trainer = self.find_one(id, user_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Conflict(format!(
            "vocab trainer {id} kept changing while reassigning vocabs"
        )))
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), ServiceError> {
        self.find_one(id, user_id).await?;
        self.trainers.delete(id).await?;
        info!(trainer_id = id, user_id, "Trainer deleted");
        Ok(())
    }

    /// Returns stored content when present. Otherwise builds it inline, or
    /// enqueues a generation job and returns its id with an empty answer
    /// set. A generation already in flight for this trainer is reused.
    pub async fn fetch_exam(&self, id: &str, user_id: &str) -> Result<ExamResponse, ServiceError> {
        let trainer = self.find_one(id, user_id).await?;
        let response = |question_answers: QuestionAnswers, job_id: Option<String>| ExamResponse {
            vocab_trainer_id: trainer.id.clone(),
            question_type: trainer.question_type,
            question_answers,
            job_id,
        };

        if !trainer.question_answers.is_empty() {
            return Ok(response(trainer.question_answers.clone(), None));
        }
        if trainer.vocabs.is_empty() {
            return Ok(response(QuestionAnswers::empty(trainer.question_type), None));
        }

        if let Some(content) = self.generator.build_inline(trainer.question_type, &trainer.vocabs) {
            let stored = self.store_generated(&trainer.id, &trainer.vocabs, content.clone()).await?;
            let question_answers = stored.map(|t| t.question_answers).unwrap_or(content);
            return Ok(response(question_answers, None));
        }

        let queue = match trainer.question_type {
            QuestionType::TranslationAudio => DIALOGUE_GENERATION,
            _ => MULTIPLE_CHOICE_GENERATION,
        };
        let job_id = self
            .queue
            .enqueue(
                queue,
                queue,
                &GenerationJobPayload {
                    vocab_trainer_id: trainer.id.clone(),
                    vocab_list: trainer.vocabs.clone(),
                    user_id: trainer.user_id.clone(),
                    version: trainer.version,
                },
                EnqueueOptions::unique(format!("{}:{}", trainer.id, trainer.version)),
            )
            .await?;
        info!(trainer_id = %trainer.id, job_id = %job_id, queue, "Exam generation queued");
        Ok(response(QuestionAnswers::empty(trainer.question_type), Some(job_id)))
    }

    /// Generation job body for multiple choice. Returns the number of
    /// questions stored, 0 when the content was discarded.
    pub async fn generate_multiple_choice(&self, payload: &GenerationJobPayload) -> Result<usize, ServiceError> {
        let questions = self
            .generator
            .multiple_choice(&payload.vocab_list, Some(&payload.user_id))
            .await;
        if questions.is_empty() && !payload.vocab_list.is_empty() {
            return Err(ServiceError::Completion(crate::ai::CompletionError::EmptyResponse));
        }
        let count = questions.len();
        if count < payload.vocab_list.len() {
            warn!(
                trainer_id = %payload.vocab_trainer_id,
                generated = count,
                requested = payload.vocab_list.len(),
                "Some multiple choice questions could not be generated"
            );
        }
        let stored = self
            .store_generated(
                &payload.vocab_trainer_id,
                &payload.vocab_list,
                QuestionAnswers::MultipleChoice(questions),
            )
            .await?;
        Ok(if stored.is_some() { count } else { 0 })
    }

    /// Generation job body for the translation-audio dialogue.
    pub async fn generate_dialogue(&self, payload: &GenerationJobPayload) -> Result<usize, ServiceError> {
        let turns = self
            .generator
            .dialogue(&payload.vocab_list, Some(&payload.user_id))
            .await?;
        let count = turns.len();
        let stored = self
            .store_generated(&payload.vocab_trainer_id, &payload.vocab_list, QuestionAnswers::Dialogue(turns))
            .await?;
        Ok(if stored.is_some() { count } else { 0 })
    }

    /// Writes content generated from `source` unless the trainer already has
    /// some, is gone, or no longer has exactly those vocabs. Version
    /// conflicts are re-read and retried.
    pub async fn store_generated(
        &self,
        trainer_id: &str,
        source: &[Vocab],
        content: QuestionAnswers,
    ) -> Result<Option<Trainer>, ServiceError> {
        for _ in 0..WRITE_ATTEMPTS {
            let Some(mut trainer) = self.trainers.find_by_id(trainer_id).await? else {
                warn!(trainer_id, "Trainer deleted before generated content was stored");
                return Ok(None);
            };
            if !same_vocabs(&trainer.vocabs, source) {
                info!(trainer_id, "Trainer vocabs changed during generation, discarding content");
                return Ok(None);
            }
            if !trainer.question_answers.is_empty() {
                debug!(trainer_id, "Trainer already has content, keeping it");
                return Ok(Some(trainer));
            }
            if content.question_type() != trainer.question_type {
                return Err(ServiceError::validation(format!(
                    "generated {} content for a {} trainer",
                    content.question_type().as_str(),
                    trainer.question_type.as_str()
                )));
            }
            trainer.question_answers = content.clone();
            match self.trainers.update(&trainer).await {
                Ok(updated) => {
                    info!(trainer_id, items = updated.question_answers.len(), "Exam content stored");
                    return Ok(Some(updated));
                }
                Err(RepositoryError::Conflict { .. }) => {
                    debug!(trainer_id, "Version conflict storing exam content, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Conflict(format!(
            "vocab trainer {trainer_id} kept changing while storing exam content"
        )))
    }

    async fn owned_vocab_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<String>, ServiceError> {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }
        if unique.is_empty() {
            return Err(ServiceError::validation("at least one vocab is required"));
        }

        let found = self.vocabs.find_by_ids(&unique).await?;
        let missing: Vec<&str> = unique
            .iter()
            .filter(|id| !found.iter().any(|v| &v.id == *id && v.user_id == user_id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::not_found(format!("vocabs {}", missing.join(", "))));
        }
        Ok(unique)
    }
}

fn same_vocabs(current: &[Vocab], source: &[Vocab]) -> bool {
    let mut current: Vec<&str> = current.iter().map(|v| v.id.as_str()).collect();
    let mut source: Vec<&str> = source.iter().map(|v| v.id.as_str()).collect();
    current.sort_unstable();
    source.sort_unstable();
    current == source
}
