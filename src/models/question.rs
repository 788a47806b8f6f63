// src/models/question.rs

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A single timed question belonging to a quiz.
/// Immutable once the owning quiz has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,

    pub quiz_id: i64,

    /// The prompt shown to participants.
    pub text: String,

    /// Ordered answer options. Indices into this list identify an option.
    pub options: Vec<String>,

    /// Indices of the correct options. Never empty, never sent to participants.
    pub correct_option_indices: Vec<u32>,

    /// Time allowed for answering, in whole seconds.
    pub duration: u32,

    /// Points awarded for a fully correct answer.
    pub points: u32,
}

impl Question {
    /// The correct options as a set, ready for scoring.
    pub fn correct_set(&self) -> BTreeSet<u32> {
        self.correct_option_indices.iter().copied().collect()
    }

    /// Strips the answer key so the question can be broadcast.
    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            text: self.text.clone(),
            options: self.options.clone(),
            duration: self.duration,
            points: self.points,
        }
    }
}

/// DTO for sending a question to participants (excludes the correct options).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub duration: u32,
    pub points: u32,
}

/// A question as handed to the record store before it has an id.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_indices: Vec<u32>,
    pub duration: u32,
    pub points: u32,
}

/// DTO for adding a question to a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1))]
    pub correct_option_indices: Vec<u32>,
    #[validate(range(min = 1, max = 3600))]
    pub duration: u32,
    #[validate(range(max = 100000))]
    pub points: u32,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 500 {
            return Err(validator::ValidationError::new("option_length"));
        }
    }
    Ok(())
}
