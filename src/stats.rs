use serde::{Deserialize, Serialize};

use crate::store::TestResult;
use crate::util::{max, mean};

/// How many results `recent_tests` carries
pub const RECENT_TESTS_LIMIT: usize = 10;

/// Rolling statistics for one user, recomputed from all of their results
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_tests: usize,
    pub average_wpm: u32,
    pub average_accuracy: u32,
    pub best_wpm: u32,
    pub best_accuracy: f64,
    pub recent_tests: Vec<TestResult>,
}

pub fn user_stats(mut results: Vec<TestResult>) -> UserStats {
    if results.is_empty() {
        return UserStats::default();
    }

    let wpms: Vec<f64> = results.iter().map(|r| r.wpm as f64).collect();
    let accuracies: Vec<f64> = results.iter().map(|r| r.accuracy).collect();

    let total_tests = results.len();
    let average_wpm = mean(&wpms).unwrap_or_default().round() as u32;
    let average_accuracy = mean(&accuracies).unwrap_or_default().round() as u32;
    let best_wpm = results.iter().map(|r| r.wpm).max().unwrap_or_default();
    let best_accuracy = max(&accuracies).unwrap_or_default();

    // newest first; ids break ties between identical timestamps
    results.sort_by(|a, b| {
        b.completed_at
            .cmp(&a.completed_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    results.truncate(RECENT_TESTS_LIMIT);

    UserStats {
        total_tests,
        average_wpm,
        average_accuracy,
        best_wpm,
        best_accuracy,
        recent_tests: results,
    }
}
