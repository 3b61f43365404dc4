use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::response::{ok, AppError};
use crate::services::ServiceError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let notifications = state
        .notifications()
        .list(&user.id, query.limit.unwrap_or(50))
        .await
        .map_err(ServiceError::from)?;
    Ok(ok(notifications))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let updated = state
        .notifications()
        .mark_read(&id, &user.id)
        .await
        .map_err(ServiceError::from)?;
    if !updated {
        return Err(AppError::not_found(format!("notification {id}")));
    }
    Ok(ok(json!({ "id": id, "isRead": true })))
}
