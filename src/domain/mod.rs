pub mod mastery;
pub mod notification;
pub mod question;
pub mod trainer;
pub mod vocab;

pub use mastery::{MasteryHistoryEntry, VocabMastery};
pub use notification::{
    NewNotification, Notification, NotificationPriority, NotificationType,
};
pub use question::{
    ChoiceOption, DialogueTurn, FillInBlankQuestion, FlipCard, MultipleChoiceQuestion,
    QuestionAnswers, QuestionType, Speaker,
};
pub use trainer::{NewTrainer, NewTrainerResult, ResultStatus, Trainer, TrainerResult, TrainerStatus};
pub use vocab::{Direction, TextTarget, Vocab, VocabExample};
