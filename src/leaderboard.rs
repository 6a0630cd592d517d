use std::cmp::Ordering;
use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::session::TestMode;
use crate::store::{TestResult, User, UserId};
use crate::util::{max, mean};

pub const DEFAULT_LIMIT: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub best_wpm: u32,
    pub average_wpm: f64,
    pub best_accuracy: f64,
    pub total_tests: usize,
}

/// Ranking used for the board: best WPM, then average WPM, then fewer
/// tests, then the older account.
fn rank(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.best_wpm
        .cmp(&a.best_wpm)
        .then_with(|| b.average_wpm.total_cmp(&a.average_wpm))
        .then_with(|| a.total_tests.cmp(&b.total_tests))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Groups `results` of `mode` by user and ranks them.
///
/// Results whose user is missing from `users` are dropped, like an inner join.
pub fn build_leaderboard(
    results: &[TestResult],
    users: &[User],
    mode: TestMode,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let users: HashMap<UserId, &User> = users.iter().map(|u| (u.id, u)).collect();

    results
        .iter()
        .filter(|r| r.mode == mode)
        .filter(|r| users.contains_key(&r.user_id))
        .into_group_map_by(|r| r.user_id)
        .into_iter()
        .map(|(user_id, rows)| {
            let user = users[&user_id];
            let wpms: Vec<f64> = rows.iter().map(|r| r.wpm as f64).collect();
            let accuracies: Vec<f64> = rows.iter().map(|r| r.accuracy).collect();

            LeaderboardEntry {
                user_id,
                name: user.name.clone(),
                email: user.email.clone(),
                best_wpm: rows.iter().map(|r| r.wpm).max().unwrap_or_default(),
                average_wpm: mean(&wpms).unwrap_or_default(),
                best_accuracy: max(&accuracies).unwrap_or_default(),
                total_tests: rows.len(),
            }
        })
        .sorted_by(rank)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: UserId, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn result(id: i64, user_id: UserId, wpm: u32, mode: TestMode) -> TestResult {
        TestResult {
            id,
            user_id,
            wpm,
            accuracy: 90.0 + (wpm % 10) as f64,
            correct_chars: 0,
            incorrect_chars: 0,
            mode,
            limit: 30,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_groups_and_orders_by_best_wpm() {
        let users = vec![user(1, "A"), user(2, "B")];
        let results = vec![
            result(1, 1, 80, TestMode::Time),
            result(2, 1, 90, TestMode::Time),
            result(3, 2, 85, TestMode::Time),
        ];

        let board = build_leaderboard(&results, &users, TestMode::Time, DEFAULT_LIMIT);

        assert_eq!(board.len(), 2);
        assert_eq!((board[0].user_id, board[0].best_wpm), (1, 90));
        assert_eq!((board[1].user_id, board[1].best_wpm), (2, 85));
        assert_eq!(board[0].average_wpm, 85.0);
        assert_eq!(board[0].total_tests, 2);
        assert_eq!(board[0].name, "A");
    }

    #[test]
    fn test_filters_by_mode() {
        let users = vec![user(1, "A"), user(2, "B")];
        let results = vec![
            result(1, 1, 120, TestMode::Words),
            result(2, 2, 60, TestMode::Time),
        ];

        let board = build_leaderboard(&results, &users, TestMode::Time, DEFAULT_LIMIT);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, 2);
    }

    #[test]
    fn test_truncates_to_limit() {
        let users: Vec<User> = (1..=20).map(|id| user(id, &format!("U{id}"))).collect();
        let results: Vec<TestResult> = (1..=20)
            .map(|id| result(id, id, 40 + id as u32, TestMode::Time))
            .collect();

        let board = build_leaderboard(&results, &users, TestMode::Time, 5);
        assert_eq!(board.len(), 5);
        assert_eq!(board[0].best_wpm, 60);
        assert_eq!(board[4].best_wpm, 56);
    }

    #[test]
    fn test_ties_break_deterministically() {
        let users = vec![user(1, "A"), user(2, "B"), user(3, "C")];
        let results = vec![
            result(1, 1, 90, TestMode::Time),
            result(2, 1, 70, TestMode::Time),
            result(3, 2, 90, TestMode::Time),
            result(4, 3, 90, TestMode::Time),
        ];

        let board = build_leaderboard(&results, &users, TestMode::Time, DEFAULT_LIMIT);
        let order: Vec<UserId> = board.iter().map(|e| e.user_id).collect();
        // B and C average 90 and beat A's 80; B is the older account
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_unknown_users_are_dropped() {
        let users = vec![user(1, "A")];
        let results = vec![result(1, 1, 50, TestMode::Time), result(2, 9, 99, TestMode::Time)];

        let board = build_leaderboard(&results, &users, TestMode::Time, DEFAULT_LIMIT);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, 1);
    }

    #[test]
    fn test_empty() {
        assert!(build_leaderboard(&[], &[], TestMode::Time, DEFAULT_LIMIT).is_empty());
    }
}
