// src/handlers/participant.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::SessionEngine,
    error::AppError,
    models::{
        answer::AnswerSubmission,
        participant::{JoinRequest, LeaveRequest},
    },
    utils::jwt::{BearerToken, Claims},
};

/// Joins a waiting quiz by room code.
///
/// No token is needed; the response carries the participant token used
/// for answering and leaving.
pub async fn join(
    State(engine): State<Arc<SessionEngine>>,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let joined = engine.join(&payload.room_code, &payload.nickname).await?;
    Ok((StatusCode::CREATED, Json(joined)))
}

pub async fn leave(
    State(engine): State<Arc<SessionEngine>>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Json(payload): Json<LeaveRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    engine.leave(&payload.room_code, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submits the caller's answer to the quiz's current question.
pub async fn submit_answer(
    State(engine): State<Arc<SessionEngine>>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<AnswerSubmission>,
) -> Result<impl IntoResponse, AppError> {
    if claims.participant_quiz()? != quiz_id {
        return Err(AppError::InvalidSubmission(
            "Token was issued for another quiz".to_string(),
        ));
    }

    let result = engine.submit_answer(quiz_id, &token, payload).await?;
    Ok(Json(result))
}
