// src/models/answer.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// DTO for submitting an answer to the current question.
/// The participant is taken from the caller's token, never from the body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: i64,
    #[validate(length(max = 64))]
    pub selected_option_indices: Vec<u32>,
}

/// Outcome of a scored answer, returned to the submitting participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub correct: bool,
    pub points_awarded: u32,
    pub total_score: i64,
    pub message: String,
    pub correct_option_indices: Vec<u32>,
}
