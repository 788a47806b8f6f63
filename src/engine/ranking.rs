// src/engine/ranking.rs

use crate::models::leaderboard::{LeaderboardEntry, Standing};

/// Ranks a room's standings.
///
/// Higher score first, then lower cumulative time. Rows equal on both share
/// a rank and the next distinct row takes `position + 1` (1, 1, 3).
/// Full ties keep their input order.
pub fn rank(mut standings: Vec<Standing>) -> Vec<LeaderboardEntry> {
    standings.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.total_time.cmp(&b.total_time))
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(standings.len());
    for (position, standing) in standings.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score == standing.score && prev.total_time == standing.total_time => {
                prev.rank
            }
            _ => position as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            participant_id: standing.participant_id,
            nickname: standing.nickname,
            score: standing.score,
            total_time: standing.total_time,
            rank,
        });
    }
    entries
}
