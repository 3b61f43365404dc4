use crate::services::app_config::{ConfigResolver, KEY_AI_MODEL};

/// Used in order when neither the user nor the system configures a model.
pub const FALLBACK_MODELS: &[&str] = &["gpt-4o-mini", "gpt-4o", "gpt-4.1-mini"];

pub async fn resolve_model_name(resolver: &dyn ConfigResolver, user_id: Option<&str>) -> String {
    if let Some(model) = resolver.get(user_id, KEY_AI_MODEL).await {
        return model.trim().to_string();
    }
    FALLBACK_MODELS
        .iter()
        .find(|m| !m.trim().is_empty())
        .map(|m| m.to_string())
        .unwrap_or_default()
}
