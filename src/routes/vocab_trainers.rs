use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::auth::AuthUser;
use crate::response::{accepted, ok, AppError};
use crate::services::vocab_trainer::{
    CreateTrainerInput, SubmitFillInBlankInput, SubmitMultipleChoiceInput,
    SubmitTranslationAudioInput, UpdateTrainerInput,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(find_one).put(update).delete(remove))
        .route("/:id/exam", get(fetch_exam))
        .route("/:id/submit/multiple-choice", post(submit_multiple_choice))
        .route("/:id/submit/fill-in-blank", post(submit_fill_in_blank))
        .route("/:id/submit/translation-audio", post(submit_translation_audio))
}

async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    let trainers = state.trainers().list(&user.id).await?;
    Ok(ok(trainers))
}

async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateTrainerInput>,
) -> Result<Response, AppError> {
    let trainer = state.trainers().create(&user.id, input).await?;
    Ok(ok(trainer))
}

async fn find_one(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let trainer = state.trainers().find_one(&id, &user.id).await?;
    Ok(ok(trainer))
}

async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateTrainerInput>,
) -> Result<Response, AppError> {
    let trainer = state.trainers().update(&id, &user.id, input).await?;
    Ok(ok(trainer))
}

async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state.trainers().delete(&id, &user.id).await?;
    Ok(ok(json!({ "id": id })))
}

async fn fetch_exam(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let exam = state.trainers().fetch_exam(&id, &user.id).await?;
    if exam.job_id.is_some() {
        return Ok(accepted(exam));
    }
    Ok(ok(exam))
}

async fn submit_multiple_choice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<SubmitMultipleChoiceInput>,
) -> Result<Response, AppError> {
    let outcome = state.trainers().submit_multiple_choice(&id, &user.id, input).await?;
    Ok(ok(outcome))
}

async fn submit_fill_in_blank(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<SubmitFillInBlankInput>,
) -> Result<Response, AppError> {
    let job_id = state.trainers().submit_fill_in_blank(&id, &user.id, input).await?;
    Ok(accepted(json!({ "vocabTrainerId": id, "jobId": job_id })))
}

async fn submit_translation_audio(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<SubmitTranslationAudioInput>,
) -> Result<Response, AppError> {
    let job_id = state
        .trainers()
        .submit_translation_audio(&id, &user.id, input)
        .await?;
    Ok(accepted(json!({ "vocabTrainerId": id, "jobId": job_id })))
}
