use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::ai::AudioAttachment;
use crate::db::RepositoryError;
use crate::domain::{
    NewTrainerResult, QuestionAnswers, QuestionType, ResultStatus, Trainer, TrainerResult,
    TrainerStatus,
};
use crate::queue::{EnqueueOptions, AUDIO_EVALUATION, FILL_IN_BLANK_EVALUATION};
use crate::services::error::ServiceError;
use crate::services::evaluator::{evaluate_multiple_choice, FillInBlankEvaluation, MultipleChoiceAnswer};

use super::matching::{match_answers, FillInBlankAnswer};
use super::state_machine::{decide, fail_unanswered, score_results, Transition};
use super::{TrainerService, WRITE_ATTEMPTS};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMultipleChoiceInput {
    #[serde(default)]
    pub count_time: Option<i32>,
    pub answers: Vec<MultipleChoiceAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFillInBlankInput {
    #[serde(default)]
    pub count_time: Option<i32>,
    pub answers: Vec<FillInBlankAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTranslationAudioInput {
    #[serde(default)]
    pub count_time: Option<i32>,
    pub audio_base64: String,
    pub mime_type: String,
    #[serde(default)]
    pub source_language_code: Option<String>,
    #[serde(default)]
    pub target_language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInBlankJobPayload {
    pub vocab_trainer_id: String,
    pub evaluations: Vec<FillInBlankEvaluation>,
    pub answer_submissions: Vec<FillInBlankAnswer>,
    /// Every vocab assigned at submission; those left unanswered are failed.
    #[serde(default)]
    pub expected_vocab_ids: Vec<String>,
    pub user_id: String,
    #[serde(default)]
    pub count_time: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioEvaluationJobPayload {
    pub vocab_trainer_id: String,
    pub user_id: String,
    pub audio_base64: String,
    pub mime_type: String,
    pub source_language_code: String,
    pub target_language_code: String,
    #[serde(default)]
    pub count_time: Option<i32>,
}

/// Result of applying one grading to a trainer. Also stored as the job
/// result of evaluation jobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingOutcome {
    pub vocab_trainer_id: String,
    pub status: TrainerStatus,
    pub score: f64,
    pub results: Vec<TrainerResult>,
    pub reminder_repeat: i32,
    /// The trainer passed its final repeat and was deleted.
    pub retired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remind_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_job_id: Option<String>,
    /// Vocabs whose mastery row could not be updated.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mastery_skipped: Vec<String>,
}

impl TrainerService {
    /// Grades multiple choice in-request and applies the outcome.
    pub async fn submit_multiple_choice(
        &self,
        id: &str,
        user_id: &str,
        input: SubmitMultipleChoiceInput,
    ) -> Result<GradingOutcome, ServiceError> {
        let trainer = self.find_one(id, user_id).await?;
        expect_type(&trainer, QuestionType::MultipleChoice)?;
        let QuestionAnswers::MultipleChoice(questions) = &trainer.question_answers else {
            return Err(ServiceError::validation("exam content is not multiple choice"));
        };
        if questions.is_empty() {
            return Err(ServiceError::validation("exam has not been generated yet"));
        }

        let mut results = evaluate_multiple_choice(questions, &input.answers);
        if results.is_empty() {
            return Err(ServiceError::validation("no answer matches a question of this exam"));
        }
        let unanswered = fail_unanswered(
            &mut results,
            questions.iter().map(|q| (q.vocab_id.as_str(), q.correct_answer.as_str())),
        );
        if unanswered > 0 {
            debug!(trainer_id = %trainer.id, unanswered, "Unanswered questions graded as failed");
        }
        let score = score_results(&results);
        self.apply_grading(id, results, score, input.count_time).await
    }

    /// Matches answers to vocabs and queues their evaluation. Returns the
    /// job id.
    pub async fn submit_fill_in_blank(
        &self,
        id: &str,
        user_id: &str,
        input: SubmitFillInBlankInput,
    ) -> Result<String, ServiceError> {
        let trainer = self.find_one(id, user_id).await?;
        expect_type(&trainer, QuestionType::FillInTheBlank)?;

        let evaluations = match_answers(&trainer.id, &trainer.vocabs, &input.answers);
        if evaluations.is_empty() {
            return Err(ServiceError::validation("no answer matches a vocab of this trainer"));
        }
        debug!(
            trainer_id = %trainer.id,
            submitted = input.answers.len(),
            matched = evaluations.len(),
            "Fill-in-blank answers matched"
        );

        let job_id = self
            .queue
            .enqueue(
                FILL_IN_BLANK_EVALUATION,
                FILL_IN_BLANK_EVALUATION,
                &FillInBlankJobPayload {
                    vocab_trainer_id: trainer.id.clone(),
                    evaluations,
                    answer_submissions: input.answers,
                    expected_vocab_ids: trainer.vocabs.iter().map(|v| v.id.clone()).collect(),
                    user_id: trainer.user_id.clone(),
                    count_time: input.count_time,
                },
                EnqueueOptions::default(),
            )
            .await?;
        info!(trainer_id = %trainer.id, job_id = %job_id, "Fill-in-blank evaluation queued");
        Ok(job_id)
    }

    pub async fn submit_translation_audio(
        &self,
        id: &str,
        user_id: &str,
        input: SubmitTranslationAudioInput,
    ) -> Result<String, ServiceError> {
        let trainer = self.find_one(id, user_id).await?;
        expect_type(&trainer, QuestionType::TranslationAudio)?;
        if trainer.question_answers.is_empty() {
            return Err(ServiceError::validation("exam has not been generated yet"));
        }
        match BASE64.decode(input.audio_base64.trim()) {
            Ok(bytes) if !bytes.is_empty() => {}
            Ok(_) => return Err(ServiceError::validation("audio is empty")),
            Err(e) => return Err(ServiceError::validation(format!("audio is not valid base64: {e}"))),
        }

        let first = trainer.vocabs.first();
        let source_language_code = input
            .source_language_code
            .or_else(|| first.map(|v| v.source_language_code.clone()))
            .unwrap_or_default();
        let target_language_code = input
            .target_language_code
            .or_else(|| first.map(|v| v.target_language_code.clone()))
            .unwrap_or_default();

        let job_id = self
            .queue
            .enqueue(
                AUDIO_EVALUATION,
                AUDIO_EVALUATION,
                &AudioEvaluationJobPayload {
                    vocab_trainer_id: trainer.id.clone(),
                    user_id: trainer.user_id.clone(),
                    audio_base64: input.audio_base64,
                    mime_type: input.mime_type,
                    source_language_code,
                    target_language_code,
                    count_time: input.count_time,
                },
                EnqueueOptions::default(),
            )
            .await?;
        info!(trainer_id = %trainer.id, job_id = %job_id, "Audio evaluation queued");
        Ok(job_id)
    }

    /// Evaluation job body for fill-in-blank answers.
    pub async fn evaluate_fill_in_blank_job(
        &self,
        payload: &FillInBlankJobPayload,
    ) -> Result<GradingOutcome, ServiceError> {
        let mut results = Vec::with_capacity(payload.evaluations.len());
        for evaluation in &payload.evaluations {
            let result = self
                .evaluator
                .evaluate_fill_in_blank(evaluation, Some(&payload.user_id))
                .await?;
            results.push(result);
        }
        fail_unanswered(
            &mut results,
            payload.expected_vocab_ids.iter().map(|id| (id.as_str(), "")),
        );
        let score = score_results(&results);
        self.apply_grading(&payload.vocab_trainer_id, results, score, payload.count_time)
            .await
    }

    /// Evaluation job body for a spoken translation of the stored dialogue.
    /// Every assigned vocab gets one result carrying the overall status.
    pub async fn evaluate_audio_job(
        &self,
        payload: &AudioEvaluationJobPayload,
    ) -> Result<GradingOutcome, ServiceError> {
        let Some(trainer) = self.trainers.find_by_id(&payload.vocab_trainer_id).await? else {
            return Err(ServiceError::not_found(format!("vocab trainer {}", payload.vocab_trainer_id)));
        };
        let QuestionAnswers::Dialogue(turns) = &trainer.question_answers else {
            return Err(ServiceError::validation("trainer has no dialogue to translate"));
        };
        let original = turns
            .iter()
            .map(|turn| format!("{:?}: {}", turn.speaker, turn.text))
            .collect::<Vec<_>>()
            .join("\n");

        let bytes = BASE64
            .decode(payload.audio_base64.trim())
            .map_err(|e| ServiceError::validation(format!("audio is not valid base64: {e}")))?;
        let audio = AudioAttachment::new(bytes, payload.mime_type.clone());

        let evaluation = self
            .evaluator
            .evaluate_translation_audio(
                &audio,
                &original,
                &payload.source_language_code,
                &payload.target_language_code,
                Some(&payload.user_id),
            )
            .await?;

        let status = ResultStatus::from_correct(evaluation.overall_score >= self.settings.pass_threshold);
        let data = serde_json::to_value(&evaluation).unwrap_or_else(|_| json!({}));
        let results: Vec<NewTrainerResult> = trainer
            .vocabs
            .iter()
            .map(|vocab| NewTrainerResult {
                vocab_id: Some(vocab.id.clone()),
                status,
                user_selected: evaluation.transcript.clone(),
                system_selected: evaluation.corrected_translation.clone(),
                data: data.clone(),
            })
            .collect();

        self.apply_grading(&trainer.id, results, evaluation.overall_score, payload.count_time)
            .await
    }

    /// Replaces the trainer's results, records mastery once per result and
    /// applies the pass/fail transition, in that order.
    pub async fn apply_grading(
        &self,
        trainer_id: &str,
        results: Vec<NewTrainerResult>,
        score: f64,
        count_time: Option<i32>,
    ) -> Result<GradingOutcome, ServiceError> {
        let Some(trainer) = self.trainers.find_by_id(trainer_id).await? else {
            return Err(ServiceError::not_found(format!("vocab trainer {trainer_id}")));
        };

        let removed = self.trainers.delete_results_by_trainer_id(trainer_id).await?;
        let stored = self.trainers.create_results(trainer_id, &results).await?;
        debug!(trainer_id, removed, inserted = stored.len(), "Trainer results replaced");

        let mut mastery_skipped = Vec::new();
        for result in &results {
            let Some(vocab_id) = result.vocab_id.as_deref() else {
                continue;
            };
            if let Err(e) = self
                .mastery
                .update_mastery(vocab_id, &trainer.user_id, result.is_passed())
                .await
            {
                error!(error = %e, trainer_id, vocab_id, "Mastery update failed, grading event not counted");
                mastery_skipped.push(vocab_id.to_string());
            }
        }

        let mut outcome = self.transition(trainer, stored, score, count_time).await?;
        outcome.mastery_skipped = mastery_skipped;
        Ok(outcome)
    }

    async fn transition(
        &self,
        mut trainer: Trainer,
        results: Vec<TrainerResult>,
        score: f64,
        count_time: Option<i32>,
    ) -> Result<GradingOutcome, ServiceError> {
        for attempt in 1..=WRITE_ATTEMPTS {
            match decide(
                trainer.reminder_repeat,
                trainer.reminder_last_remind,
                score,
                &self.settings,
                Utc::now(),
            ) {
                Transition::Retire { reminder_repeat } => {
                    self.trainers.delete(&trainer.id).await?;
                    trainer.reminder_repeat = reminder_repeat;
                    trainer.status = TrainerStatus::Passed;
                    if let Err(e) = self.dispatcher.on_completed(&trainer).await {
                        warn!(error = %e, trainer_id = %trainer.id, "Completion notification failed");
                    }
                    info!(trainer_id = %trainer.id, score, "Trainer retired after final repeat");
                    return Ok(GradingOutcome {
                        vocab_trainer_id: trainer.id,
                        status: TrainerStatus::Passed,
                        score,
                        results,
                        reminder_repeat,
                        retired: true,
                        remind_at: None,
                        reminder_job_id: None,
                        mastery_skipped: Vec::new(),
                    });
                }
                Transition::Continue {
                    status,
                    reminder_repeat,
                    remind_at,
                } => {
                    let mut next = trainer.clone();
                    next.status = status;
                    next.reminder_repeat = reminder_repeat;
                    next.reminder_last_remind = Some(remind_at);
                    next.reminder_disabled = false;
                    if let Some(seconds) = count_time {
                        next.count_time = seconds.max(0);
                    }

                    let updated = match self.trainers.update(&next).await {
                        Ok(updated) => updated,
                        Err(RepositoryError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                            debug!(trainer_id = %trainer.id, attempt, "Version conflict applying grading, re-reading");
                            let Some(fresh) = self.trainers.find_by_id(&trainer.id).await? else {
                                return Err(ServiceError::not_found(format!("vocab trainer {}", trainer.id)));
                            };
                            trainer = fresh;
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    let reminder_job_id = match self.dispatcher.on_outcome(&updated, score, remind_at).await {
                        Ok((_, job_id)) => Some(job_id),
                        Err(e) => {
                            warn!(error = %e, trainer_id = %updated.id, "Outcome notification failed");
                            None
                        }
                    };
                    info!(
                        trainer_id = %updated.id,
                        status = status.as_str(),
                        score,
                        reminder_repeat,
                        "Trainer graded"
                    );
                    return Ok(GradingOutcome {
                        vocab_trainer_id: updated.id,
                        status,
                        score,
                        results,
                        reminder_repeat,
                        retired: false,
                        remind_at: Some(remind_at),
                        reminder_job_id,
                        mastery_skipped: Vec::new(),
                    });
                }
            }
        }
        Err(ServiceError::Conflict(format!(
            "vocab trainer {} kept changing while applying grading",
            trainer.id
        )))
    }
}

fn expect_type(trainer: &Trainer, expected: QuestionType) -> Result<(), ServiceError> {
    if trainer.question_type != expected {
        return Err(ServiceError::validation(format!(
            "trainer {} is {}, not {}",
            trainer.id,
            trainer.question_type.as_str(),
            expected.as_str()
        )));
    }
    Ok(())
}
