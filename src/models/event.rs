// src/models/event.rs

use serde::{Deserialize, Serialize};

use super::{leaderboard::Leaderboard, participant::ParticipantView, question::PublicQuestion};

/// Events pushed to every subscriber of a room.
/// Serialized as `{"type": "...", "payload": ...}`; payload-less events omit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    NewQuestion(PublicQuestion),
    /// Seconds remaining on the active question.
    TimerUpdate(u32),
    QuestionEnded,
    QuizStarted,
    QuizEnded,
    LeaderboardUpdate(Leaderboard),
    ParticipantJoined(ParticipantView),
    ParticipantLeft(ParticipantView),
}

impl RoomEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::NewQuestion(_) => "NEW_QUESTION",
            RoomEvent::TimerUpdate(_) => "TIMER_UPDATE",
            RoomEvent::QuestionEnded => "QUESTION_ENDED",
            RoomEvent::QuizStarted => "QUIZ_STARTED",
            RoomEvent::QuizEnded => "QUIZ_ENDED",
            RoomEvent::LeaderboardUpdate(_) => "LEADERBOARD_UPDATE",
            RoomEvent::ParticipantJoined(_) => "PARTICIPANT_JOINED",
            RoomEvent::ParticipantLeft(_) => "PARTICIPANT_LEFT",
        }
    }
}

/// Wire envelope delivered to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    #[serde(flatten)]
    pub event: RoomEvent,
    pub room_code: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl RoomMessage {
    pub fn new(room_code: &str, event: RoomEvent) -> Self {
        Self {
            event,
            room_code: room_code.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
