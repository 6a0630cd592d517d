//! Client side of result persistence.
//!
//! Persistence is best effort: a failed submission is logged and dropped, and
//! stats or leaderboard failures degrade to empty read models so a finished
//! test is never blocked on the backend.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::{Api, LeaderboardQuery};
use crate::error::ApiResponse;
use crate::leaderboard::LeaderboardEntry;
use crate::metrics::Metrics;
use crate::runtime::CancelToken;
use crate::session::TestMode;
use crate::stats::UserStats;
use crate::store::{ResultId, ResultStore};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed with {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// The bearer token was missing, expired or not ours
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Status { status: 401, .. })
    }
}

/// Body of a result submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSubmission {
    pub wpm: u32,
    pub accuracy: f64,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub mode: TestMode,
    pub limit: u32,
}

impl ResultSubmission {
    pub fn new(metrics: &Metrics, mode: TestMode, limit: u32) -> Self {
        Self {
            wpm: metrics.wpm,
            accuracy: metrics.accuracy,
            correct_chars: metrics.correct_chars,
            incorrect_chars: metrics.incorrect_chars,
            mode,
            limit,
        }
    }
}

/// Remote operations the client performs
pub trait ResultsApi {
    fn submit_result(&self, token: &str, submission: &ResultSubmission) -> Result<ResultId, ClientError>;
    fn my_stats(&self, token: &str) -> Result<UserStats, ClientError>;
    fn leaderboard(&self, mode: TestMode, limit: usize) -> Result<Vec<LeaderboardEntry>, ClientError>;
}

fn check(response: ApiResponse) -> Result<Value, ClientError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ClientError::Status {
            status: response.status,
            message: response.error_message().unwrap_or_default().to_string(),
        })
    }
}

/// Calls the handlers in-process against a local store
pub struct LocalApi<S: ResultStore> {
    api: Arc<Api<S>>,
}

impl<S: ResultStore> LocalApi<S> {
    pub fn new(api: Arc<Api<S>>) -> Self {
        Self { api }
    }
}

impl<S: ResultStore> ResultsApi for LocalApi<S> {
    fn submit_result(&self, token: &str, submission: &ResultSubmission) -> Result<ResultId, ClientError> {
        let body = serde_json::to_value(submission)?;
        let header = format!("Bearer {token}");
        let body = check(self.api.submit_result(Some(&header), &body))?;

        Ok(serde_json::from_value(body["resultId"].clone())?)
    }

    fn my_stats(&self, token: &str) -> Result<UserStats, ClientError> {
        let header = format!("Bearer {token}");
        let body = check(self.api.my_stats(Some(&header)))?;

        Ok(serde_json::from_value(body)?)
    }

    fn leaderboard(&self, mode: TestMode, limit: usize) -> Result<Vec<LeaderboardEntry>, ClientError> {
        let body = check(self.api.leaderboard(&LeaderboardQuery::new(mode, limit)))?;

        Ok(serde_json::from_value(body["leaderboard"].clone())?)
    }
}

/// What happened to a finished session's result
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Not logged in; nothing was sent
    Skipped,
    /// Already submitted for this session
    AlreadySaved,
    /// Saved, with the stats read back afterwards (if that read worked)
    Saved(Option<UserStats>),
    /// The submission failed and was dropped
    Failed,
    /// The owner went away before the response could be applied
    Cancelled,
}

/// Submits the result of one finished session, at most once
pub struct ResultSubmitter<A: ResultsApi> {
    api: A,
    token: Option<String>,
    saved: bool,
    cancel: CancelToken,
}

impl<A: ResultsApi> ResultSubmitter<A> {
    pub fn new(api: A, token: Option<String>) -> Self {
        Self {
            api,
            token,
            saved: false,
            cancel: CancelToken::new(),
        }
    }

    /// Shares the owner's "still mounted" flag
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Clears the saved flag for the next session
    pub fn reset(&mut self) {
        self.saved = false;
    }

    pub fn on_finished(&mut self, metrics: &Metrics, mode: TestMode, limit: u32) -> SubmitOutcome {
        let Some(token) = self.token.as_deref() else {
            debug!("not logged in, skipping result submission");
            return SubmitOutcome::Skipped;
        };

        if self.saved {
            return SubmitOutcome::AlreadySaved;
        }
        self.saved = true;

        let submission = ResultSubmission::new(metrics, mode, limit);
        let submitted = self.api.submit_result(token, &submission);

        if self.cancel.is_cancelled() {
            return SubmitOutcome::Cancelled;
        }

        if let Err(err) = submitted {
            warn!("failed to save result: {err}");
            return SubmitOutcome::Failed;
        }

        let stats = match self.api.my_stats(token) {
            Ok(stats) => Some(stats),
            Err(err) => {
                warn!("failed to load stats: {err}");
                None
            }
        };

        match self.cancel.guard(stats) {
            Some(stats) => SubmitOutcome::Saved(stats),
            None => SubmitOutcome::Cancelled,
        }
    }
}

/// Stats for display, falling back to an empty record
pub fn stats_or_default<A: ResultsApi>(api: &A, token: &str) -> UserStats {
    api.my_stats(token).unwrap_or_else(|err| {
        warn!("failed to load stats: {err}");
        UserStats::default()
    })
}

/// Like [`stats_or_default`], except a rejected token is returned so the
/// caller can ask the user to log in again
pub fn stats_unless_unauthorized<A: ResultsApi>(api: &A, token: &str) -> Result<UserStats, ClientError> {
    match api.my_stats(token) {
        Err(err) if err.is_unauthorized() => Err(err),
        Err(err) => {
            warn!("failed to load stats: {err}");
            Ok(UserStats::default())
        }
        Ok(stats) => Ok(stats),
    }
}

/// Leaderboard for display, falling back to an empty board
pub fn leaderboard_or_empty<A: ResultsApi>(api: &A, mode: TestMode, limit: usize) -> Vec<LeaderboardEntry> {
    api.leaderboard(mode, limit).unwrap_or_else(|err| {
        warn!("failed to load leaderboard: {err}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeApi {
        calls: RefCell<Vec<&'static str>>,
        fail_submit: bool,
        fail_reads: bool,
        reject_token: bool,
        cancel_on_submit: Option<CancelToken>,
    }

    impl ResultsApi for &FakeApi {
        fn submit_result(&self, _token: &str, _submission: &ResultSubmission) -> Result<ResultId, ClientError> {
            self.calls.borrow_mut().push("submit");
            if let Some(token) = &self.cancel_on_submit {
                token.cancel();
            }
            if self.fail_submit {
                return Err(ClientError::Status { status: 500, message: "boom".into() });
            }
            Ok(1)
        }

        fn my_stats(&self, _token: &str) -> Result<UserStats, ClientError> {
            self.calls.borrow_mut().push("stats");
            if self.reject_token {
                return Err(ClientError::Status { status: 401, message: "Unauthorized".into() });
            }
            if self.fail_reads {
                return Err(ClientError::Status { status: 500, message: "boom".into() });
            }
            Ok(UserStats {
                total_tests: 1,
                ..Default::default()
            })
        }

        fn leaderboard(&self, _mode: TestMode, _limit: usize) -> Result<Vec<LeaderboardEntry>, ClientError> {
            self.calls.borrow_mut().push("leaderboard");
            Err(ClientError::Status { status: 500, message: "Failed to fetch leaderboard".into() })
        }
    }

    fn metrics() -> Metrics {
        Metrics {
            wpm: 72,
            accuracy: 98.0,
            correct_chars: 49,
            incorrect_chars: 1,
        }
    }

    #[test]
    fn test_unauthenticated_sends_nothing() {
        let api = FakeApi::default();
        let mut submitter = ResultSubmitter::new(&api, None);

        assert_eq!(submitter.on_finished(&metrics(), TestMode::Time, 30), SubmitOutcome::Skipped);
        assert!(api.calls.borrow().is_empty());
    }

    #[test]
    fn test_submits_once_then_reads_stats() {
        let api = FakeApi::default();
        let mut submitter = ResultSubmitter::new(&api, Some("token".into()));

        assert_matches!(
            submitter.on_finished(&metrics(), TestMode::Time, 30),
            SubmitOutcome::Saved(Some(stats)) if stats.total_tests == 1
        );
        assert_eq!(
            submitter.on_finished(&metrics(), TestMode::Time, 30),
            SubmitOutcome::AlreadySaved
        );
        assert_eq!(*api.calls.borrow(), vec!["submit", "stats"]);
    }

    #[test]
    fn test_failed_submission_is_swallowed_without_retry() {
        let api = FakeApi {
            fail_submit: true,
            ..Default::default()
        };
        let mut submitter = ResultSubmitter::new(&api, Some("token".into()));

        assert_eq!(submitter.on_finished(&metrics(), TestMode::Words, 50), SubmitOutcome::Failed);
        assert_eq!(
            submitter.on_finished(&metrics(), TestMode::Words, 50),
            SubmitOutcome::AlreadySaved
        );
        assert_eq!(*api.calls.borrow(), vec!["submit"]);
    }

    #[test]
    fn test_stats_failure_still_counts_as_saved() {
        let api = FakeApi {
            fail_reads: true,
            ..Default::default()
        };
        let mut submitter = ResultSubmitter::new(&api, Some("token".into()));

        assert_eq!(submitter.on_finished(&metrics(), TestMode::Time, 15), SubmitOutcome::Saved(None));
    }

    #[test]
    fn test_cancelled_owner_ignores_response() {
        let cancel = CancelToken::new();
        let api = FakeApi {
            cancel_on_submit: Some(cancel.clone()),
            ..Default::default()
        };
        let mut submitter = ResultSubmitter::new(&api, Some("token".into())).with_cancel_token(cancel);

        assert_eq!(submitter.on_finished(&metrics(), TestMode::Time, 15), SubmitOutcome::Cancelled);
        assert_eq!(*api.calls.borrow(), vec!["submit"]);
    }

    #[test]
    fn test_reset_allows_next_session() {
        let api = FakeApi::default();
        let mut submitter = ResultSubmitter::new(&api, Some("token".into()));

        submitter.on_finished(&metrics(), TestMode::Time, 15);
        assert!(submitter.is_saved());
        submitter.reset();
        assert_matches!(submitter.on_finished(&metrics(), TestMode::Time, 15), SubmitOutcome::Saved(_));
    }

    #[test]
    fn test_read_models_degrade() {
        let api = FakeApi {
            fail_reads: true,
            ..Default::default()
        };

        assert_eq!(stats_or_default(&&api, "token"), UserStats::default());
        assert!(leaderboard_or_empty(&&api, TestMode::Time, 15).is_empty());
        assert_eq!(stats_unless_unauthorized(&&api, "token").unwrap(), UserStats::default());
    }

    #[test]
    fn test_rejected_token_surfaces_from_stats() {
        let api = FakeApi {
            reject_token: true,
            ..Default::default()
        };

        assert_matches!(
            stats_unless_unauthorized(&&api, "expired"),
            Err(err) if err.is_unauthorized()
        );
        // the degrading read still hides it
        assert_eq!(stats_or_default(&&api, "expired"), UserStats::default());

        let ok = FakeApi::default();
        assert_eq!(stats_unless_unauthorized(&&ok, "token").unwrap().total_tests, 1);
    }
}
