use serde::{Deserialize, Serialize};

use crate::session::TestMode;

/// Standard word length used for WPM
pub const CHARS_PER_WORD: f64 = 5.0;

/// How a single reference position renders against the typed input
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum CharState {
    Correct,
    Incorrect,
    Pending,
}

/// Results of a finished (or in-flight) typing attempt
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub wpm: u32,
    pub accuracy: f64,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
}

impl Metrics {
    pub fn typed_chars(&self) -> usize {
        self.correct_chars + self.incorrect_chars
    }
}

/// Number of positions where `typed` matches `reference`
pub fn correct_chars(reference: &str, typed: &str) -> usize {
    reference
        .chars()
        .zip(typed.chars())
        .filter(|(expected, actual)| expected == actual)
        .count()
}

/// Elapsed seconds to feed into [`compute_metrics`].
///
/// Time mode derives it from the countdown; word mode uses the active
/// seconds counted by the session. `remaining` must never exceed `total`.
pub fn elapsed_secs_for(mode: TestMode, total_secs: u64, remaining_secs: u64, active_secs: u64) -> u64 {
    match mode {
        TestMode::Time => {
            debug_assert!(
                remaining_secs <= total_secs,
                "remaining time exceeds total duration"
            );
            total_secs.saturating_sub(remaining_secs)
        }
        TestMode::Words => active_secs,
    }
}

pub fn compute_metrics(reference: &str, typed: &str, elapsed_secs: u64) -> Metrics {
    let typed_chars = typed.chars().count();
    let correct = correct_chars(reference, typed);
    let incorrect = typed_chars - correct;

    let accuracy = if typed_chars > 0 {
        (correct as f64 / typed_chars as f64) * 100.0
    } else {
        0.0
    };

    let elapsed_minutes = elapsed_secs as f64 / 60.0;
    let wpm = if elapsed_minutes > 0.0 {
        ((typed_chars as f64 / CHARS_PER_WORD) / elapsed_minutes).round() as u32
    } else {
        0
    };

    Metrics {
        wpm,
        accuracy,
        correct_chars: correct,
        incorrect_chars: incorrect,
    }
}

/// Per-position states across the whole reference text
pub fn char_states(reference: &str, typed: &str) -> Vec<CharState> {
    let mut typed = typed.chars();

    reference
        .chars()
        .map(|expected| match typed.next() {
            Some(actual) if actual == expected => CharState::Correct,
            Some(_) => CharState::Incorrect,
            None => CharState::Pending,
        })
        .collect()
}
