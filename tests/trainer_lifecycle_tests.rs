//! End-to-end trainer flows over the in-memory stack: exam generation jobs,
//! grading, the repeat/retire state machine, mastery and reminders.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use common::{default_responder, Harness, USER};
use vocab_trainer_backend::ai::ScriptedCompletionClient;
use vocab_trainer_backend::db::{
    MasteryRepository, NotificationRepository, RepositoryError, TrainerRepository,
};
use vocab_trainer_backend::domain::{
    MasteryHistoryEntry, NotificationType, QuestionAnswers, QuestionType, ResultStatus, Trainer,
    TrainerStatus, Vocab, VocabMastery,
};
use vocab_trainer_backend::queue::{JobState, MULTIPLE_CHOICE_GENERATION};
use vocab_trainer_backend::services::evaluator::MultipleChoiceAnswer;
use vocab_trainer_backend::services::notification::ReminderDelivery;
use vocab_trainer_backend::services::vocab_trainer::{
    CreateTrainerInput, SubmitFillInBlankInput, SubmitMultipleChoiceInput,
    SubmitTranslationAudioInput, UpdateTrainerInput,
};
use vocab_trainer_backend::services::ServiceError;

async fn create_trainer(harness: &Harness, question_type: QuestionType, vocabs: &[&Vocab]) -> Trainer {
    harness
        .trainers()
        .create(
            USER,
            CreateTrainerInput {
                name: "Daily words".to_string(),
                question_type,
                set_count_time: None,
                vocab_ids: vocabs.iter().map(|v| v.id.clone()).collect(),
            },
        )
        .await
        .unwrap()
}

async fn generated_trainer(harness: &Harness, question_type: QuestionType, vocabs: &[&Vocab]) -> Trainer {
    let trainer = create_trainer(harness, question_type, vocabs).await;
    let exam = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    assert!(exam.job_id.is_some());
    harness.drain().await;
    harness.trainers().find_one(&trainer.id, USER).await.unwrap()
}

async fn set_repeat(harness: &Harness, trainer_id: &str, repeat: i32, last_remind: Option<chrono::DateTime<Utc>>) {
    let mut trainer = TrainerRepository::find_by_id(harness.store.as_ref(), trainer_id)
        .await
        .unwrap()
        .unwrap();
    trainer.reminder_repeat = repeat;
    trainer.reminder_last_remind = last_remind;
    TrainerRepository::update(harness.store.as_ref(), &trainer).await.unwrap();
}

fn correct_answers(trainer: &Trainer) -> Vec<MultipleChoiceAnswer> {
    let QuestionAnswers::MultipleChoice(questions) = &trainer.question_answers else {
        panic!("expected multiple choice content");
    };
    questions
        .iter()
        .map(|q| MultipleChoiceAnswer {
            user_selected: q.correct_answer.clone(),
            system_selected: Some(q.correct_answer.clone()),
            vocab_id: Some(q.vocab_id.clone()),
        })
        .collect()
}

#[tokio::test]
async fn multiple_choice_exam_has_one_question_per_vocab() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let dog = harness.vocab("dog", &["con chó"]).await;
    let fish = harness.vocab("fish", &["con cá"]).await;

    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat, &dog, &fish]).await;

    let QuestionAnswers::MultipleChoice(questions) = &trainer.question_answers else {
        panic!("expected multiple choice content");
    };
    assert_eq!(questions.len(), 3);
    for question in questions {
        assert_eq!(question.options.len(), 4);
        assert!(question.options.iter().any(|o| o.value == question.correct_answer));
    }
}

#[tokio::test]
async fn fetching_twice_reuses_the_generation_job() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = create_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;

    let first = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    let second = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    assert_eq!(first.job_id, second.job_id);

    assert_eq!(harness.drain().await, 1);
    let record = harness
        .queue
        .status(first.job_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, JobState::Completed);

    let third = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    assert!(third.job_id.is_none());
    assert_eq!(third.question_answers.len(), 1);
}

#[tokio::test]
async fn all_correct_answers_pass_and_any_miss_fails() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let dog = harness.vocab("dog", &["con chó"]).await;
    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat, &dog]).await;

    let mut answers = correct_answers(&trainer);
    answers[1].user_selected = "distractor one".to_string();
    let failed = harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: Some(42),
                answers,
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.status, TrainerStatus::Failed);
    assert_eq!(failed.score, 50.0);
    assert_eq!(failed.reminder_repeat, 0);

    let passed = harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: None,
                answers: correct_answers(&trainer),
            },
        )
        .await
        .unwrap();
    assert_eq!(passed.status, TrainerStatus::Passed);
    assert_eq!(passed.reminder_repeat, 1);
    assert!(passed.results.iter().all(|r| r.status == ResultStatus::Passed));

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.results.len(), 2);
    assert_eq!(stored.count_time, 42);
}

#[tokio::test]
async fn unanswered_questions_count_against_the_score() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let dog = harness.vocab("dog", &["con chó"]).await;
    let fish = harness.vocab("fish", &["con cá"]).await;
    let bird = harness.vocab("bird", &["con chim"]).await;
    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat, &dog, &fish, &bird]).await;

    let mut answers = correct_answers(&trainer);
    answers.truncate(1);
    let outcome = harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: None,
                answers,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, TrainerStatus::Failed);
    assert_eq!(outcome.score, 25.0);
    assert_eq!(outcome.reminder_repeat, 0);

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.results.len(), 4);
    let unanswered: Vec<_> = stored.results.iter().filter(|r| r.user_selected.is_empty()).collect();
    assert_eq!(unanswered.len(), 3);
    assert!(unanswered.iter().all(|r| r.status == ResultStatus::Failed));
}

#[tokio::test]
async fn fill_in_blank_scores_every_assigned_vocab() {
    let harness = Harness::new();
    let hello = harness.vocab("hello", &["xin chào"]).await;
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = create_trainer(&harness, QuestionType::FillInTheBlank, &[&hello, &cat]).await;

    harness
        .trainers()
        .submit_fill_in_blank(
            &trainer.id,
            USER,
            serde_json::from_value::<SubmitFillInBlankInput>(json!({
                "answers": [{ "userAnswer": "xin chào", "systemAnswer": "xin chào" }]
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(harness.client.call_count(), 0);
    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.status, TrainerStatus::Failed);
    assert_eq!(stored.reminder_repeat, 0);
    assert_eq!(stored.results.len(), 2);
    let missed = stored
        .results
        .iter()
        .find(|r| r.vocab_id.as_deref() == Some(cat.id.as_str()))
        .unwrap();
    assert_eq!(missed.status, ResultStatus::Failed);
}

#[tokio::test]
async fn correct_multiple_choice_answer_raises_mastery() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;
    let mastery = harness.runtime.state.mastery();
    assert!(mastery.find(&cat.id, USER).await.unwrap().is_none());

    harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: None,
                answers: correct_answers(&trainer),
            },
        )
        .await
        .unwrap();

    let row = mastery.find(&cat.id, USER).await.unwrap().unwrap();
    assert_eq!(row.mastery_score, 1);
    assert_eq!(row.correct_count, 1);
    assert_eq!(mastery.history(&cat.id, USER, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn one_failing_vocab_is_left_out_of_the_exam() {
    let harness = Harness::with_client(ScriptedCompletionClient::new(|call| {
        if call.prompt.starts_with("You write vocabulary quiz questions.") && call.prompt.contains("\"fish\"") {
            return Ok("not json at all".to_string());
        }
        default_responder(call)
    }));
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let dog = harness.vocab("dog", &["con chó"]).await;
    let fish = harness.vocab("fish", &["con cá"]).await;
    let trainer = create_trainer(&harness, QuestionType::MultipleChoice, &[&cat, &dog, &fish]).await;

    let exam = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    harness.drain().await;

    let record = harness
        .queue
        .status(exam.job_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, JobState::Completed);

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    let QuestionAnswers::MultipleChoice(questions) = &stored.question_answers else {
        panic!("expected multiple choice content");
    };
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.vocab_id != fish.id));
}

#[tokio::test]
async fn reassigning_vocabs_discards_in_flight_generation() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let dog = harness.vocab("dog", &["con chó"]).await;
    let trainer = create_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;

    let first = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    harness
        .trainers()
        .update(
            &trainer.id,
            USER,
            UpdateTrainerInput {
                vocab_ids: Some(vec![dog.id.clone()]),
                ..UpdateTrainerInput::default()
            },
        )
        .await
        .unwrap();
    let second = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    assert!(second.job_id.is_some());
    assert_ne!(first.job_id, second.job_id);

    harness.drain().await;

    let stale = harness
        .queue
        .status(first.job_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stale.state, JobState::Completed);

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    let assigned: Vec<&str> = stored.vocabs.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(assigned, vec![dog.id.as_str()]);
    let QuestionAnswers::MultipleChoice(questions) = &stored.question_answers else {
        panic!("expected multiple choice content");
    };
    let question_vocabs: Vec<&str> = questions.iter().map(|q| q.vocab_id.as_str()).collect();
    assert_eq!(question_vocabs, vec![dog.id.as_str()]);
}

/// Mastery storage that is down.
struct UnavailableMastery;

fn unavailable() -> RepositoryError {
    RepositoryError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl MasteryRepository for UnavailableMastery {
    async fn find_by_vocab_id_and_user_id(
        &self,
        _vocab_id: &str,
        _user_id: &str,
    ) -> Result<Option<VocabMastery>, RepositoryError> {
        Err(unavailable())
    }

    async fn create(&self, _mastery: &VocabMastery) -> Result<VocabMastery, RepositoryError> {
        Err(unavailable())
    }

    async fn apply_grade(
        &self,
        _id: &str,
        _is_correct: bool,
        _at: DateTime<Utc>,
    ) -> Result<VocabMastery, RepositoryError> {
        Err(unavailable())
    }

    async fn append_history(&self, _entry: &MasteryHistoryEntry) -> Result<(), RepositoryError> {
        Err(unavailable())
    }

    async fn history(
        &self,
        _vocab_id: &str,
        _user_id: &str,
        _limit: i64,
    ) -> Result<Vec<MasteryHistoryEntry>, RepositoryError> {
        Err(unavailable())
    }

    async fn list_by_user(&self, _user_id: &str) -> Result<Vec<VocabMastery>, RepositoryError> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn failed_mastery_write_is_reported_in_the_outcome() {
    let harness = Harness::with_mastery(Arc::new(UnavailableMastery));
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;

    let outcome = harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: None,
                answers: correct_answers(&trainer),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, TrainerStatus::Passed);
    assert_eq!(outcome.mastery_skipped, vec![cat.id.clone()]);
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["masterySkipped"], json!([cat.id]));
}

#[tokio::test]
async fn passing_the_final_repeat_retires_the_trainer() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;
    set_repeat(&harness, &trainer.id, 5, Some(Utc::now())).await;

    let outcome = harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: None,
                answers: correct_answers(&trainer),
            },
        )
        .await
        .unwrap();

    assert!(outcome.retired);
    assert_eq!(outcome.reminder_repeat, 6);
    let err = harness.trainers().find_one(&trainer.id, USER).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let notifications = NotificationRepository::list_by_user(harness.store.as_ref(), USER, 50)
        .await
        .unwrap();
    let achievements = notifications
        .iter()
        .filter(|n| n.notification_type == NotificationType::Achievement)
        .count();
    assert_eq!(achievements, 1);
}

#[tokio::test]
async fn passing_schedules_the_next_reminder_one_interval_out() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = generated_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;
    let last = Utc::now();
    set_repeat(&harness, &trainer.id, 4, Some(last)).await;

    let outcome = harness
        .trainers()
        .submit_multiple_choice(
            &trainer.id,
            USER,
            SubmitMultipleChoiceInput {
                count_time: None,
                answers: correct_answers(&trainer),
            },
        )
        .await
        .unwrap();

    assert!(!outcome.retired);
    assert_eq!(outcome.reminder_repeat, 5);
    let remind_at = outcome.remind_at.unwrap();
    let expected = last + Duration::days(2);
    assert!((remind_at - expected).num_milliseconds().abs() <= 1);
    assert!(outcome.reminder_job_id.is_some());

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.status, TrainerStatus::Passed);
    assert_eq!(stored.reminder_last_remind, Some(remind_at));
}

#[tokio::test]
async fn submission_for_another_type_is_rejected() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = create_trainer(&harness, QuestionType::FlipCard, &[&cat]).await;

    let err = harness
        .trainers()
        .submit_fill_in_blank(
            &trainer.id,
            USER,
            serde_json::from_value::<SubmitFillInBlankInput>(json!({
                "answers": [{ "userAnswer": "con mèo", "systemAnswer": "con mèo" }]
            }))
            .unwrap(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn exact_fill_in_blank_answer_raises_mastery() {
    let harness = Harness::new();
    let hello = harness.vocab("hello", &["xin chào"]).await;
    let trainer = create_trainer(&harness, QuestionType::FillInTheBlank, &[&hello]).await;

    let job_id = harness
        .trainers()
        .submit_fill_in_blank(
            &trainer.id,
            USER,
            serde_json::from_value::<SubmitFillInBlankInput>(json!({
                "answers": [{ "userAnswer": "xin chào", "systemAnswer": "xin chào" }]
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    harness.drain().await;

    let record = harness.queue.status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(harness.client.call_count(), 0);

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.status, TrainerStatus::Passed);
    assert_eq!(stored.results.len(), 1);
    assert_eq!(stored.results[0].status, ResultStatus::Passed);

    let mastery = harness
        .runtime
        .state
        .mastery()
        .find(&hello.id, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mastery.mastery_score, 1);
    assert_eq!(mastery.correct_count, 1);
}

#[tokio::test]
async fn wrong_fill_in_blank_answer_is_judged_by_the_model() {
    let harness = Harness::new();
    let hello = harness.vocab("hello", &["xin chào"]).await;
    let trainer = create_trainer(&harness, QuestionType::FillInTheBlank, &[&hello]).await;

    harness
        .trainers()
        .submit_fill_in_blank(
            &trainer.id,
            USER,
            serde_json::from_value::<SubmitFillInBlankInput>(json!({
                "answers": [{ "userAnswer": "tạm biệt", "systemAnswer": "xin chào" }]
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(harness.client.call_count(), 1);
    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.status, TrainerStatus::Failed);
    assert_eq!(stored.reminder_repeat, 0);
}

#[tokio::test]
async fn translation_audio_flow_grades_every_vocab() {
    let harness = Harness::new();
    let hello = harness.vocab("hello", &["xin chào"]).await;
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = generated_trainer(&harness, QuestionType::TranslationAudio, &[&hello, &cat]).await;

    let QuestionAnswers::Dialogue(turns) = &trainer.question_answers else {
        panic!("expected a dialogue");
    };
    assert_eq!(turns.len(), 4);
    let text = turns.iter().map(|t| t.text.to_lowercase()).collect::<Vec<_>>().join(" ");
    assert!(text.contains("hello") && text.contains("cat"));

    harness
        .trainers()
        .submit_translation_audio(
            &trainer.id,
            USER,
            SubmitTranslationAudioInput {
                count_time: None,
                audio_base64: BASE64.encode(b"fake-audio"),
                mime_type: "audio/webm".to_string(),
                source_language_code: None,
                target_language_code: None,
            },
        )
        .await
        .unwrap();
    harness.drain().await;

    let stored = harness.trainers().find_one(&trainer.id, USER).await.unwrap();
    assert_eq!(stored.status, TrainerStatus::Passed);
    assert_eq!(stored.results.len(), 2);
    assert!(stored.results.iter().all(|r| r.system_selected == "xin chào bạn"));
    assert!(harness.client.calls().iter().any(|c| c.audio_mime.as_deref() == Some("audio/webm")));
}

#[tokio::test]
async fn audio_submission_requires_generated_dialogue() {
    let harness = Harness::new();
    let hello = harness.vocab("hello", &["xin chào"]).await;
    let trainer = create_trainer(&harness, QuestionType::TranslationAudio, &[&hello]).await;

    let err = harness
        .trainers()
        .submit_translation_audio(
            &trainer.id,
            USER,
            SubmitTranslationAudioInput {
                count_time: None,
                audio_base64: BASE64.encode(b"fake-audio"),
                mime_type: "audio/webm".to_string(),
                source_language_code: None,
                target_language_code: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn reminder_is_delivered_once_per_time() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = create_trainer(&harness, QuestionType::FlipCard, &[&cat]).await;
    let remind_at = Utc::now() - Duration::minutes(5);
    let remind_at = remind_at - Duration::nanoseconds(remind_at.timestamp_subsec_nanos() as i64);
    set_repeat(&harness, &trainer.id, 1, Some(remind_at)).await;

    let dispatcher = harness.runtime.state.notifications();
    let first = dispatcher.deliver_reminder(&trainer.id, remind_at).await.unwrap();
    let second = dispatcher.deliver_reminder(&trainer.id, remind_at).await.unwrap();
    assert!(matches!(first, ReminderDelivery::Delivered(_)));
    assert!(matches!(second, ReminderDelivery::AlreadyDelivered));

    let swept = harness
        .runtime
        .workers
        .sweep_reminders(remind_at - Duration::hours(1), Utc::now())
        .await
        .unwrap();
    assert_eq!(swept, 0);
}

#[tokio::test]
async fn generation_for_deleted_trainer_is_not_retried() {
    let harness = Harness::new();
    let cat = harness.vocab("cat", &["con mèo"]).await;
    let trainer = create_trainer(&harness, QuestionType::MultipleChoice, &[&cat]).await;
    let exam = harness.trainers().fetch_exam(&trainer.id, USER).await.unwrap();
    harness.trainers().delete(&trainer.id, USER).await.unwrap();

    harness.drain().await;

    let record = harness
        .queue
        .status(exam.job_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, JobState::Completed);
    assert!(harness.queue.dead_letters(MULTIPLE_CHOICE_GENERATION).await.unwrap().is_empty());
}
