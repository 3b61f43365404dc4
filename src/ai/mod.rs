pub mod client;
pub mod json;
pub mod model;
pub mod prompts;
pub mod retry;
pub mod scripted;

pub use client::{
    transcribe, AudioAttachment, CompletionClient, CompletionError, HttpCompletionClient,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use scripted::ScriptedCompletionClient;
