// src/models/leaderboard.rs

use serde::{Deserialize, Serialize};

/// Raw input to the ranker: one row per participant in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub participant_id: i64,
    pub nickname: String,
    pub score: i64,
    /// Cumulative elapsed seconds across answered questions.
    pub total_time: u32,
}

/// A ranked leaderboard row. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub participant_id: i64,
    pub nickname: String,
    pub score: i64,
    pub total_time: u32,
    /// 1-based competition rank. Ties share a rank and leave a gap.
    pub rank: u32,
}

/// Leaderboard as broadcast to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    /// `true` once the quiz has ended.
    pub is_final: bool,
}
