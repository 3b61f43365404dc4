#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};

use vocab_trainer_backend::ai::scripted::RecordedCall;
use vocab_trainer_backend::ai::{CompletionError, RetryPolicy, ScriptedCompletionClient};
use vocab_trainer_backend::config::{Config, TrainerSettings, WorkerSettings};
use vocab_trainer_backend::core::{EventBus, EventPublisher};
use vocab_trainer_backend::db::{MasteryRepository, MemoryStore, VocabRepository};
use vocab_trainer_backend::domain::{TextTarget, Vocab};
use vocab_trainer_backend::queue::JobQueue;
use vocab_trainer_backend::services::app_config::StaticConfigResolver;
use vocab_trainer_backend::services::vocab_trainer::TrainerService;
use vocab_trainer_backend::{assemble, build_router, Runtime, Storage};

pub const USER: &str = "user-1";

pub fn test_config() -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        log_level: "warn".to_string(),
        database_url: None,
        redis_url: None,
        trainer: TrainerSettings::default(),
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        worker: WorkerSettings::default(),
    }
}

/// Text between the first pair of double quotes on the line starting with
/// `prefix`.
fn quoted_after(prompt: &str, prefix: &str) -> Option<String> {
    let line = prompt.lines().find(|l| l.starts_with(prefix))?;
    let start = line.find('"')? + 1;
    let end = start + line[start..].find('"')?;
    Some(line[start..end].to_string())
}

/// Answers every prompt kind the backend sends with well-formed output.
pub fn default_responder(call: &RecordedCall) -> Result<String, CompletionError> {
    let prompt = call.prompt.as_str();
    if call.audio_mime.is_some() {
        return Ok("xin chào bạn, con mèo".to_string());
    }
    if prompt.starts_with("You write vocabulary quiz questions.") {
        let correct = quoted_after(prompt, "Correct translation").unwrap_or_default();
        return Ok(json!({
            "content": quoted_after(prompt, "Question word").unwrap_or_default(),
            "options": [
                { "label": correct, "value": correct },
                { "label": "distractor one", "value": "distractor one" },
                { "label": "distractor two", "value": "distractor two" },
                { "label": "distractor three", "value": "distractor three" }
            ],
            "correctAnswer": correct
        })
        .to_string());
    }
    if prompt.starts_with("Write a short natural dialogue") {
        let words: Vec<String> = prompt
            .split("spelled exactly as given:")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default()
            .split('"')
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect();
        return Ok(json!({
            "dialogue": [
                { "speaker": "A", "text": format!("Today I learned {}.", words.join(" and ")) },
                { "speaker": "B", "text": "That sounds useful." },
                { "speaker": "A", "text": "Shall we practice together?" },
                { "speaker": "B", "text": "Yes, let's start." }
            ]
        })
        .to_string());
    }
    if prompt.starts_with("You grade a vocabulary exercise.") {
        return Ok(r#"```json
{"isCorrect": false, "explanation": "The meaning is different."}
```"#
            .to_string());
    }
    if prompt.starts_with("You assess a spoken translation.") {
        return Ok(json!({
            "overallScore": 12,
            "meaningCoverage": 90,
            "scores": { "accuracy": 8, "fluency": 8, "register": 8, "completeness": 2 },
            "errors": [],
            "missingIdeas": [],
            "correctedTranslation": "xin chào bạn",
            "advice": ["Keep going."]
        })
        .to_string());
    }
    if prompt.starts_with("Translate the") {
        return Ok(r#"{"translations": [{"textTarget": "chào", "explanation": "informal"}]}"#.to_string());
    }
    Err(CompletionError::Parse(format!("unexpected prompt: {prompt}")))
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub client: Arc<ScriptedCompletionClient>,
    pub queue: Arc<JobQueue>,
    pub bus: Arc<EventBus>,
    pub runtime: Runtime,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(ScriptedCompletionClient::new(default_responder))
    }

    pub fn with_client(client: ScriptedCompletionClient) -> Self {
        Self::build(client, None)
    }

    /// Memory storage except for mastery, which goes to `mastery`.
    pub fn with_mastery(mastery: Arc<dyn MasteryRepository>) -> Self {
        Self::build(ScriptedCompletionClient::new(default_responder), Some(mastery))
    }

    fn build(client: ScriptedCompletionClient, mastery: Option<Arc<dyn MasteryRepository>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(client);
        let queue = Arc::new(JobQueue::in_memory());
        let bus = Arc::new(EventBus::new());
        let mut storage = Storage::memory(store.clone(), Arc::new(StaticConfigResolver::new()));
        if let Some(mastery) = mastery {
            storage.mastery = mastery;
        }
        let runtime = assemble(
            &test_config(),
            storage,
            client.clone(),
            queue.clone(),
            EventPublisher::local(bus.clone()),
        );
        Self {
            store,
            client,
            queue,
            bus,
            runtime,
        }
    }

    pub fn trainers(&self) -> Arc<TrainerService> {
        self.runtime.state.trainers()
    }

    pub fn router(&self) -> Router {
        build_router(self.runtime.state.clone())
    }

    pub async fn drain(&self) -> usize {
        self.runtime.workers.run_until_idle().await.unwrap()
    }

    pub async fn vocab(&self, source: &str, targets: &[&str]) -> Vocab {
        let vocab = Vocab {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: USER.to_string(),
            text_source: source.to_string(),
            source_language_code: "en".to_string(),
            target_language_code: "vi".to_string(),
            text_targets: targets.iter().map(|t| TextTarget::plain(*t)).collect(),
            created_at: Utc::now(),
        };
        VocabRepository::create(self.store.as_ref(), &vocab).await.unwrap()
    }
}

pub fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", USER)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
