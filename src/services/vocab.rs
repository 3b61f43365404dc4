use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::json::parse_model_json;
use crate::ai::{prompts, retry_with_backoff, CompletionClient, RetryPolicy};
use crate::db::VocabRepository;
use crate::domain::{TextTarget, Vocab};
use crate::queue::{EnqueueOptions, JobQueue, VOCAB_TRANSLATION};

use super::error::ServiceError;

const MAX_TRANSLATIONS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVocabInput {
    pub text_source: String,
    pub source_language_code: String,
    pub target_language_code: String,
    #[serde(default)]
    pub text_targets: Vec<TextTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabTranslationJobPayload {
    pub vocab_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedTranslations {
    #[serde(default)]
    translations: Vec<GeneratedTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedTranslation {
    text_target: String,
    #[serde(default)]
    explanation: Option<String>,
}

pub struct VocabService {
    vocabs: Arc<dyn VocabRepository>,
    client: Arc<dyn CompletionClient>,
    queue: Arc<JobQueue>,
    retry: RetryPolicy,
}

impl VocabService {
    pub fn new(
        vocabs: Arc<dyn VocabRepository>,
        client: Arc<dyn CompletionClient>,
        queue: Arc<JobQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            vocabs,
            client,
            queue,
            retry,
        }
    }

    pub async fn create(&self, user_id: &str, input: CreateVocabInput) -> Result<Vocab, ServiceError> {
        let text_source = input.text_source.trim();
        if text_source.is_empty() {
            return Err(ServiceError::validation("textSource is required"));
        }
        if input.source_language_code.trim().is_empty() || input.target_language_code.trim().is_empty() {
            return Err(ServiceError::validation("language codes are required"));
        }
        let vocab = Vocab {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            text_source: text_source.to_string(),
            source_language_code: input.source_language_code.trim().to_string(),
            target_language_code: input.target_language_code.trim().to_string(),
            text_targets: input.text_targets,
            created_at: Utc::now(),
        };
        Ok(self.vocabs.create(&vocab).await?)
    }

    pub async fn find_one(&self, id: &str, user_id: &str) -> Result<Vocab, ServiceError> {
        match self.vocabs.find_by_id(id).await? {
            Some(vocab) if vocab.user_id == user_id => Ok(vocab),
            _ => Err(ServiceError::not_found(format!("vocab {id}"))),
        }
    }

    /// Queues auto-translation of the vocab's source text. Returns the job id.
    pub async fn request_translation(&self, id: &str, user_id: &str) -> Result<String, ServiceError> {
        let vocab = self.find_one(id, user_id).await?;
        let job_id = self
            .queue
            .enqueue(
                VOCAB_TRANSLATION,
                VOCAB_TRANSLATION,
                &VocabTranslationJobPayload {
                    vocab_id: vocab.id.clone(),
                    user_id: vocab.user_id.clone(),
                },
                EnqueueOptions::unique(vocab.id.clone()),
            )
            .await?;
        debug!(vocab_id = id, job_id = %job_id, "Vocab translation queued");
        Ok(job_id)
    }

    /// Job body: asks the model for translations and merges the new ones
    /// after the existing targets.
    pub async fn translate(&self, payload: &VocabTranslationJobPayload) -> Result<Vocab, ServiceError> {
        let Some(vocab) = self.vocabs.find_by_id(&payload.vocab_id).await? else {
            return Err(ServiceError::not_found(format!("vocab {}", payload.vocab_id)));
        };

        let prompt = prompts::vocab_translation(
            &vocab.text_source,
            &vocab.source_language_code,
            &vocab.target_language_code,
        );
        let client = self.client.as_ref();
        let user_id = Some(payload.user_id.as_str());
        let generated = retry_with_backoff(&self.retry, "vocab-translation", |_attempt| {
            let prompt = prompt.as_str();
            async move {
                let raw = client.generate(prompt, user_id, None).await?;
                parse_model_json::<GeneratedTranslations>(&raw)
            }
        })
        .await?;

        let mut targets = vocab.text_targets.clone();
        let mut added = 0usize;
        for translation in generated.translations.into_iter().take(MAX_TRANSLATIONS) {
            let text = translation.text_target.trim();
            if text.is_empty() || vocab.matches_text(text) || targets.iter().any(|t| t.text_target == text) {
                continue;
            }
            let mut target = TextTarget::plain(text);
            target.explanation_source = translation.explanation.filter(|e| !e.trim().is_empty());
            targets.push(target);
            added += 1;
        }
        if added == 0 {
            return Ok(vocab);
        }

        let updated = self.vocabs.update_text_targets(&vocab.id, &targets).await?;
        info!(vocab_id = %vocab.id, added, "Vocab auto-translated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ScriptedCompletionClient;
    use crate::db::MemoryStore;
    use std::time::Duration;

    fn service(client: Arc<ScriptedCompletionClient>) -> (VocabService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = VocabService::new(
            store.clone(),
            client,
            Arc::new(JobQueue::in_memory()),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );
        (service, store)
    }

    #[tokio::test]
    async fn translation_appends_only_new_targets() {
        let client = Arc::new(ScriptedCompletionClient::constant(
            r#"{"translations": [{"textTarget": "xin chào", "explanation": "greeting"},
                                 {"textTarget": "chào", "explanation": "short"}]}"#,
        ));
        let (service, _store) = service(client);
        let vocab = service
            .create(
                "u1",
                CreateVocabInput {
                    text_source: "hello".to_string(),
                    source_language_code: "en".to_string(),
                    target_language_code: "vi".to_string(),
                    text_targets: vec![TextTarget::plain("xin chào")],
                },
            )
            .await
            .unwrap();

        let updated = service
            .translate(&VocabTranslationJobPayload {
                vocab_id: vocab.id.clone(),
                user_id: "u1".to_string(),
            })
            .await
            .unwrap();
        let texts: Vec<&str> = updated.target_texts().collect();
        assert_eq!(texts, vec!["xin chào", "chào"]);
        assert_eq!(updated.text_targets[1].explanation_source.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn other_users_vocab_is_not_found() {
        let (service, _store) = service(Arc::new(ScriptedCompletionClient::constant("{}")));
        let vocab = service
            .create(
                "u1",
                CreateVocabInput {
                    text_source: "cat".to_string(),
                    source_language_code: "en".to_string(),
                    target_language_code: "vi".to_string(),
                    text_targets: Vec::new(),
                },
            )
            .await
            .unwrap();
        let err = service.request_translation(&vocab.id, "u2").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
