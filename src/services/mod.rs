pub mod app_config;
pub mod error;
pub mod evaluator;
pub mod exam_generator;
pub mod mastery;
pub mod notification;
pub mod vocab;
pub mod vocab_trainer;

pub use error::ServiceError;
