use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::response::{accepted, ok, AppError};
use crate::services::vocab::CreateVocabInput;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/:id", get(find_one))
        .route("/:id/auto-translate", post(auto_translate))
        .route("/:id/mastery", get(mastery))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateVocabInput>,
) -> Result<Response, AppError> {
    let vocab = state.vocabs().create(&user.id, input).await?;
    Ok(ok(vocab))
}

async fn find_one(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let vocab = state.vocabs().find_one(&id, &user.id).await?;
    Ok(ok(vocab))
}

async fn auto_translate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = state.vocabs().request_translation(&id, &user.id).await?;
    Ok(accepted(json!({ "vocabId": id, "jobId": job_id })))
}

async fn mastery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    state.vocabs().find_one(&id, &user.id).await?;
    let tracker = state.mastery();
    let current = tracker
        .find(&id, &user.id)
        .await
        .map_err(crate::services::ServiceError::from)?;
    let history = tracker
        .history(&id, &user.id, query.limit.unwrap_or(50))
        .await
        .map_err(crate::services::ServiceError::from)?;
    Ok(ok(json!({ "mastery": current, "history": history })))
}
