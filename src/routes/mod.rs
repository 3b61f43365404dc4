mod health;
mod jobs;
mod notifications;
mod vocab_trainers;
mod vocabs;

use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/vocab-trainers", vocab_trainers::router())
        .nest("/api/vocabs", vocabs::router())
        .nest("/api/jobs", jobs::router())
        .nest("/api/notifications", notifications::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    AppError::not_found("route not found").into_response()
}
