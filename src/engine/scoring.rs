// src/engine/scoring.rs

use std::collections::BTreeSet;

/// Outcome of scoring one submission against a question's answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub correctly_selected: u32,
    pub incorrectly_selected: u32,
    pub fully_correct: bool,
    pub points: u32,
}

/// Scores a submission.
///
/// * Submitted indices are treated as a set; repeats count once.
/// * Any incorrect selection awards zero points.
/// * Otherwise the award is `points * k / n` rounded half away from zero,
///   where `k` is the number of correct options hit and `n` the size of the key.
pub fn score(correct: &BTreeSet<u32>, submitted: &[u32], points: u32) -> Score {
    let selected: BTreeSet<u32> = submitted.iter().copied().collect();

    let correctly_selected = selected.intersection(correct).count() as u32;
    let incorrectly_selected = selected.len() as u32 - correctly_selected;
    let total_correct = correct.len() as u32;

    let fully_correct =
        total_correct > 0 && correctly_selected == total_correct && incorrectly_selected == 0;

    let points = if incorrectly_selected > 0 {
        0
    } else {
        partial_credit(points, correctly_selected, total_correct)
    };

    Score {
        correctly_selected,
        incorrectly_selected,
        fully_correct,
        points,
    }
}

/// `round(points * hits / total)` rounded half away from zero, in integer arithmetic.
fn partial_credit(points: u32, hits: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let numerator = 2 * u64::from(points) * u64::from(hits) + u64::from(total);
    (numerator / (2 * u64::from(total))) as u32
}

/// Human readable feedback for an answer result.
pub fn feedback(score: &Score, total_correct: usize) -> String {
    if score.fully_correct {
        "Correct answer!".to_string()
    } else if score.points > 0 {
        format!(
            "Partially correct. You selected {} out of {} correct options. +{} points",
            score.correctly_selected, total_correct, score.points
        )
    } else {
        "Incorrect answer. No points awarded.".to_string()
    }
}
