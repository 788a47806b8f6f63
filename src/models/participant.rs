// src/models/participant.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Room codes are six decimal digits.
pub static ROOM_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("room code pattern is valid"));

/// A player who joined a quiz through its room code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: i64,
    pub quiz_id: i64,

    /// Unique within the quiz, case-sensitive.
    pub nickname: String,

    /// Cumulative score. Never decreases once the quiz has started.
    pub score: i64,

    /// Seconds spent on scored answers, summed over questions. Breaks score ties.
    pub total_time: u32,

    /// Opaque credential issued on join.
    pub token: String,
}

impl Participant {
    pub fn view(&self, room_code: &str) -> ParticipantView {
        ParticipantView {
            id: self.id,
            nickname: self.nickname.clone(),
            score: self.score,
            room_code: room_code.to_string(),
        }
    }
}

/// A participant as handed to the record store before it has an id.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub quiz_id: i64,
    pub nickname: String,
    pub token: String,
}

/// Public view of a participant, used in room events and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: i64,
    pub nickname: String,
    pub score: i64,
    pub room_code: String,
}

/// DTO for joining a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[validate(regex(path = *ROOM_CODE_PATTERN, message = "Room code must be six digits."))]
    pub room_code: String,
    #[validate(length(
        min = 1,
        max = 30,
        message = "Nickname length must be between 1 and 30 characters."
    ))]
    pub nickname: String,
}

/// Returned to a participant after a successful join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub token: String,
    pub participant_id: i64,
    pub quiz_id: i64,
}

/// DTO for leaving a quiz. The nickname comes from the caller's token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    #[validate(regex(path = *ROOM_CODE_PATTERN, message = "Room code must be six digits."))]
    pub room_code: String,
}
