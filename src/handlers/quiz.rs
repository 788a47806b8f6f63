// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{engine::SessionEngine, error::AppError};

/// Lifecycle status of a quiz. Clients poll this to recover from a missed broadcast.
pub async fn get_status(
    State(engine): State<Arc<SessionEngine>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.status(quiz_id).await?))
}

/// The active question, without correct options.
pub async fn get_current_question(
    State(engine): State<Arc<SessionEngine>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.current_question(quiz_id).await?))
}

pub async fn get_leaderboard(
    State(engine): State<Arc<SessionEngine>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.leaderboard(quiz_id).await?))
}

pub async fn list_participants(
    State(engine): State<Arc<SessionEngine>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.participants(quiz_id).await?))
}
