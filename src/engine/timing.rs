// src/engine/timing.rs

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tokio::time::Instant;

/// Ephemeral per-room record of how long participants took to answer.
#[derive(Debug)]
struct RoomLedger {
    question_started: Instant,
    duration: u32,
    answered: HashSet<i64>,
    totals: HashMap<i64, u32>,
}

impl RoomLedger {
    fn new(question_started: Instant, duration: u32) -> Self {
        Self {
            question_started,
            duration,
            answered: HashSet::new(),
            totals: HashMap::new(),
        }
    }
}

/// Per-room, per-participant elapsed-time ledger used to break score ties.
/// Keyed by room code; holds participant ids only. Torn down with the room,
/// so the engine copies each total onto the participant record as it grows.
#[derive(Debug, Default)]
pub struct TimingTracker {
    rooms: DashMap<String, RoomLedger>,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a new question and clears the answered set.
    /// Cumulative totals carry over from earlier questions.
    pub fn question_started(&self, room_code: &str, at: Instant, duration: u32) {
        self.rooms
            .entry(room_code.to_string())
            .and_modify(|ledger| {
                ledger.question_started = at;
                ledger.duration = duration;
                ledger.answered.clear();
            })
            .or_insert_with(|| RoomLedger::new(at, duration));
    }

    /// Adds `elapsed` (clamped to `[0, duration]`) to the participant's total
    /// and marks them as having answered the active question.
    /// Returns `false`, recording nothing, if they had already answered it.
    pub fn record_answer(&self, room_code: &str, participant_id: i64, elapsed: i64) -> bool {
        let mut ledger = self
            .rooms
            .entry(room_code.to_string())
            .or_insert_with(|| RoomLedger::new(Instant::now(), 0));

        if !ledger.answered.insert(participant_id) {
            return false;
        }
        let clamped = elapsed.clamp(0, i64::from(ledger.duration)) as u32;
        *ledger.totals.entry(participant_id).or_insert(0) += clamped;
        true
    }

    /// Whole seconds since the active question started, capped at its duration.
    /// Measured from the start instant rather than the countdown so every
    /// participant inside the same tick window gets the same treatment.
    pub fn exact_elapsed(&self, room_code: &str) -> u32 {
        self.rooms
            .get(room_code)
            .map(|ledger| {
                let secs = ledger.question_started.elapsed().as_secs();
                secs.min(u64::from(ledger.duration)) as u32
            })
            .unwrap_or(0)
    }

    pub fn total_time(&self, room_code: &str, participant_id: i64) -> u32 {
        self.rooms
            .get(room_code)
            .and_then(|ledger| ledger.totals.get(&participant_id).copied())
            .unwrap_or(0)
    }

    pub fn has_answered(&self, room_code: &str, participant_id: i64) -> bool {
        self.rooms
            .get(room_code)
            .map(|ledger| ledger.answered.contains(&participant_id))
            .unwrap_or(false)
    }

    pub fn clear(&self, room_code: &str) {
        self.rooms.remove(room_code);
    }

    pub fn tracked_rooms(&self) -> usize {
        self.rooms.len()
    }
}
