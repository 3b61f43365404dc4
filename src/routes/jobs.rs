use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::auth::AuthUser;
use crate::core::{EventBus, EventFilter};
use crate::response::{ok, AppError};
use crate::services::ServiceError;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_TYPES: [&str; 5] = ["generating", "evaluating", "completed", "failed", "notification"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stream", get(stream))
        .route("/:id", get(status))
}

async fn status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let record = state.queue().status(&id).await.map_err(ServiceError::from)?;
    match record {
        Some(record) if record.user_id.as_deref() == Some(user.id.as_str()) => Ok(ok(record)),
        _ => Err(AppError::not_found(format!("job {id}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamQuery {
    vocab_trainer_id: Option<String>,
    /// Comma separated event types.
    event_types: Option<String>,
}

/// Removes the bus subscription when the client disconnects.
struct SubscriptionGuard {
    bus: Arc<EventBus>,
    subscriber_id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let bus = Arc::clone(&self.bus);
        let subscriber_id = std::mem::take(&mut self.subscriber_id);
        tokio::spawn(async move {
            bus.unsubscribe(&subscriber_id).await;
        });
    }
}

async fn stream(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let event_types = query.event_types.as_deref().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|v| EVENT_TYPES.contains(v))
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let bus = Arc::clone(state.events().bus());
    let (subscriber_id, receiver) = bus
        .subscribe_filtered(EventFilter {
            user_id: Some(user.id.clone()),
            trainer_id: query.vocab_trainer_id,
            event_types,
        })
        .await;
    let guard = SubscriptionGuard { bus, subscriber_id };

    let events = BroadcastStream::new(receiver).filter_map(move |message| {
        let _guard = &guard;
        let event = match message {
            Ok(envelope) => {
                let data = serde_json::to_string(&envelope.event).unwrap_or_else(|_| "{}".to_string());
                Some(Ok::<Event, Infallible>(
                    Event::default()
                        .id(envelope.id)
                        .event(envelope.event.event_type())
                        .data(data),
                ))
            }
            Err(_) => None,
        };
        async move { event }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
