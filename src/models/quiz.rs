// src/models/quiz.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::question::Question;

/// Lifecycle of a quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizStatus {
    /// Defined by the host, not yet open for joining.
    Created,
    /// Open for joining, not started.
    Waiting,
    /// Questions are being played.
    Started,
    /// Ended by the host or by running out of questions.
    Finished,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Created => "CREATED",
            QuizStatus::Waiting => "WAITING",
            QuizStatus::Started => "STARTED",
            QuizStatus::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for QuizStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(QuizStatus::Created),
            "WAITING" => Ok(QuizStatus::Waiting),
            "STARTED" => Ok(QuizStatus::Started),
            "FINISHED" => Ok(QuizStatus::Finished),
            other => Err(format!("unknown quiz status '{}'", other)),
        }
    }
}

/// Aggregate root of a live session. Owns its questions outright;
/// participants point back at the quiz by id only.
#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: i64,
    pub host_id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Six-digit code participants type in to join.
    pub room_code: String,

    pub max_participants: u32,
    pub status: QuizStatus,

    /// Index into `questions`. Always `Some` and in range while STARTED.
    pub current_question_index: Option<usize>,

    pub questions: Vec<Question>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Quiz {
    pub fn is_host(&self, host_id: i64) -> bool {
        self.host_id == host_id
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question_index
            .and_then(|idx| self.questions.get(idx))
    }

    /// Moves to the following question. Returns `false` (index untouched)
    /// when the current question is the last one.
    pub fn advance_to_next_question(&mut self) -> bool {
        let next = self.current_question_index.map_or(0, |idx| idx + 1);
        if next >= self.questions.len() {
            return false;
        }
        self.current_question_index = Some(next);
        true
    }

    pub fn summary(&self) -> QuizSummary {
        QuizSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            room_code: self.room_code.clone(),
            max_participants: self.max_participants,
            status: self.status,
            current_question_index: self.current_question_index,
            question_count: self.questions.len(),
            created_at: self.created_at,
        }
    }
}

/// A quiz as handed to the record store before it has an id.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub host_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub room_code: String,
    pub max_participants: u32,
}

/// DTO for a host defining a new quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub max_participants: Option<u32>,
}

/// Host-facing view of a quiz (no answer keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub room_code: String,
    pub max_participants: u32,
    pub status: QuizStatus,
    pub current_question_index: Option<usize>,
    pub question_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
