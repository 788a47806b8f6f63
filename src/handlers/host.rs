// src/handlers/host.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    engine::SessionEngine,
    error::AppError,
    models::{question::CreateQuestionRequest, quiz::CreateQuizRequest},
    utils::jwt::Claims,
};

/// Creates a quiz owned by the calling host.
///
/// The quiz starts in `CREATED` with a freshly allocated six-digit room code.
/// Returns 201 Created and the quiz summary.
pub async fn create_quiz(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = engine.create_quiz(claims.host_id()?, payload).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Full quiz including answer keys. Host only.
pub async fn get_quiz(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = engine.quiz_for_host(quiz_id, claims.host_id()?).await?;
    Ok(Json(json!({
        "quiz": quiz.summary(),
        "questions": quiz.questions,
    })))
}

/// Appends a question. Only allowed before the quiz starts.
pub async fn add_question(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = engine
        .add_question(quiz_id, claims.host_id()?, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn open_quiz(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = engine.open_quiz(quiz_id, claims.host_id()?).await?;
    Ok(Json(quiz))
}

pub async fn start_quiz(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = engine.start(quiz_id, claims.host_id()?).await?;
    Ok(Json(quiz))
}

/// Advances to the next question.
/// Past the last question the quiz finishes and the response is 409.
pub async fn next_question(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = engine.next_question(quiz_id, claims.host_id()?).await?;
    Ok(Json(question))
}

/// Ends the quiz and returns the final leaderboard.
pub async fn end_quiz(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let leaderboard = engine.end(quiz_id, claims.host_id()?).await?;
    Ok(Json(leaderboard))
}

pub async fn remove_participant(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path((quiz_id, participant_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    engine
        .remove_participant(quiz_id, participant_id, claims.host_id()?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Removes all participants and returns the quiz to `CREATED`.
pub async fn reset_participants(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let removed = engine
        .reset_participants(quiz_id, claims.host_id()?)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}
