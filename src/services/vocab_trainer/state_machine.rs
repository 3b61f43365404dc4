use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::config::TrainerSettings;
use serde_json::json;

use crate::domain::{NewTrainerResult, ResultStatus, TrainerStatus};

/// What a grading outcome does to a trainer.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The final repeat was passed; the trainer is deleted.
    Retire { reminder_repeat: i32 },
    Continue {
        status: TrainerStatus,
        reminder_repeat: i32,
        remind_at: DateTime<Utc>,
    },
}

/// Appends a FAILED result for every expected `(vocab_id, correct_answer)`
/// that has no result yet. Returns how many were added.
pub fn fail_unanswered<'a>(
    results: &mut Vec<NewTrainerResult>,
    expected: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> usize {
    let mut added = 0usize;
    for (vocab_id, correct_answer) in expected {
        if results.iter().any(|r| r.vocab_id.as_deref() == Some(vocab_id)) {
            continue;
        }
        results.push(NewTrainerResult {
            vocab_id: Some(vocab_id.to_string()),
            status: ResultStatus::Failed,
            user_selected: String::new(),
            system_selected: correct_answer.to_string(),
            data: json!({ "unanswered": true }),
        });
        added += 1;
    }
    added
}

/// Percentage of PASSED results, 0 when there are none.
pub fn score_results(results: &[NewTrainerResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.is_passed()).count();
    passed as f64 * 100.0 / results.len() as f64
}

pub fn status_for_score(score: f64, settings: &TrainerSettings) -> TrainerStatus {
    if score >= settings.pass_threshold {
        TrainerStatus::Passed
    } else {
        TrainerStatus::Failed
    }
}

/// Next reminder: one interval after the last one, or now when the trainer
/// was never reminded. Truncated to milliseconds so it survives storage
/// unchanged and can serve as a dedupe key.
pub fn next_reminder(
    last_remind: Option<DateTime<Utc>>,
    settings: &TrainerSettings,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let at = match last_remind {
        Some(last) => last + settings.reminder_interval,
        None => now,
    };
    at.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(at)
}

pub fn decide(
    reminder_repeat: i32,
    last_remind: Option<DateTime<Utc>>,
    score: f64,
    settings: &TrainerSettings,
    now: DateTime<Utc>,
) -> Transition {
    let status = status_for_score(score, settings);
    let reminder_repeat = match status {
        TrainerStatus::Passed => reminder_repeat + 1,
        _ => reminder_repeat,
    };
    if status == TrainerStatus::Passed && reminder_repeat >= settings.max_repeat {
        return Transition::Retire { reminder_repeat };
    }
    Transition::Continue {
        status,
        reminder_repeat,
        remind_at: next_reminder(last_remind, settings, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(status: ResultStatus) -> NewTrainerResult {
        NewTrainerResult {
            vocab_id: None,
            status,
            user_selected: String::new(),
            system_selected: String::new(),
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let settings = TrainerSettings::default();
        assert_eq!(status_for_score(70.0, &settings), TrainerStatus::Passed);
        assert_eq!(status_for_score(69.99, &settings), TrainerStatus::Failed);
    }

    #[test]
    fn score_counts_passed_share() {
        let results = vec![
            result(ResultStatus::Passed),
            result(ResultStatus::Passed),
            result(ResultStatus::Failed),
            result(ResultStatus::Passed),
        ];
        assert_eq!(score_results(&results), 75.0);
        assert_eq!(score_results(&[]), 0.0);
    }

    #[test]
    fn unanswered_questions_count_as_failures() {
        let mut results = vec![NewTrainerResult {
            vocab_id: Some("v1".to_string()),
            ..result(ResultStatus::Passed)
        }];
        let added = fail_unanswered(
            &mut results,
            [("v1", "con mèo"), ("v2", "con chó"), ("v3", "con cá"), ("v4", "con gà")],
        );
        assert_eq!(added, 3);
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].vocab_id.as_deref(), Some("v2"));
        assert_eq!(results[1].status, ResultStatus::Failed);
        assert_eq!(results[1].system_selected, "con chó");
        assert_eq!(score_results(&results), 25.0);
    }

    #[test]
    fn fifth_repeat_pass_retires() {
        let settings = TrainerSettings::default();
        let now = Utc::now();
        assert_eq!(
            decide(5, None, 100.0, &settings, now),
            Transition::Retire { reminder_repeat: 6 }
        );
    }

    #[test]
    fn pass_below_max_schedules_two_days_after_last_reminder() {
        let settings = TrainerSettings::default();
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        match decide(4, Some(last), 80.0, &settings, now) {
            Transition::Continue {
                status,
                reminder_repeat,
                remind_at,
            } => {
                assert_eq!(status, TrainerStatus::Passed);
                assert_eq!(reminder_repeat, 5);
                assert_eq!(remind_at, Utc.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap());
            }
            other => panic!("unexpected transition {other:?}"),
        }
    }

    #[test]
    fn failure_keeps_repeat_and_reminds_now_when_never_reminded() {
        let settings = TrainerSettings::default();
        let now = Utc::now();
        match decide(5, None, 10.0, &settings, now) {
            Transition::Continue {
                status,
                reminder_repeat,
                remind_at,
            } => {
                assert_eq!(status, TrainerStatus::Failed);
                assert_eq!(reminder_repeat, 5);
                assert!((now - remind_at).num_milliseconds() < 1);
                assert_eq!(remind_at.timestamp_subsec_nanos() % 1_000_000, 0);
            }
            other => panic!("unexpected transition {other:?}"),
        }
    }
}
