use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::{AudioAttachment, CompletionClient, CompletionError};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub user_id: Option<String>,
    pub audio_mime: Option<String>,
}

type Responder = dyn Fn(&RecordedCall) -> Result<String, CompletionError> + Send + Sync;

/// In-process completion backend answering from a closure. Used for local
/// runs without provider credentials and by the test suites.
pub struct ScriptedCompletionClient {
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedCompletionClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn generate(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        audio: Option<&AudioAttachment>,
    ) -> Result<String, CompletionError> {
        let call = RecordedCall {
            prompt: prompt.to_string(),
            user_id: user_id.map(str::to_string),
            audio_mime: audio.map(|a| a.mime_type.clone()),
        };
        let response = (self.responder)(&call);
        self.calls.lock().push(call);
        response
    }
}
