use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::metrics::{self, CharState, Metrics};

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;

/// Test termination rule
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TestMode {
    #[default]
    Time,
    Words,
}

impl FromStr for TestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(TestMode::Time),
            "words" => Ok(TestMode::Words),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Active,
    Paused,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: TestMode,
    /// Seconds in time mode, target word count in word mode
    pub limit: u32,
    pub idle_timeout_secs: u64,
}

impl SessionConfig {
    pub fn timed(secs: u32) -> Self {
        Self {
            mode: TestMode::Time,
            limit: secs,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }

    pub fn words(count: u32) -> Self {
        Self {
            mode: TestMode::Words,
            limit: count,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }

    /// Countdown length, only defined for time mode
    pub fn duration_secs(&self) -> Option<u64> {
        match self.mode {
            TestMode::Time => Some(self.limit as u64),
            TestMode::Words => None,
        }
    }
}

/// Time source for a session
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock; clones share the same time
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Everything that changes during one attempt
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Typed chars, one per reference position
    pub input: Vec<char>,
    pub started_at: Option<Instant>,
    pub last_input_at: Option<Instant>,
    pub seconds_remaining: Option<u64>,
    /// Ticks counted while active
    pub active_secs: u64,
    pub metrics: Option<Metrics>,
}

impl SessionState {
    fn fresh(config: &SessionConfig) -> Self {
        Self {
            status: SessionStatus::Idle,
            input: Vec::new(),
            started_at: None,
            last_input_at: None,
            seconds_remaining: config.duration_secs(),
            active_secs: 0,
            metrics: None,
        }
    }
}

type CompletionCallback = Box<dyn FnMut(&Metrics) + Send>;

/// Drives a single typing attempt against a fixed reference text
pub struct Session<C: Clock = SystemClock> {
    reference: String,
    config: SessionConfig,
    reference_len: usize,
    state: SessionState,
    clock: C,
    on_complete: Option<CompletionCallback>,
}

impl Session<SystemClock> {
    pub fn new(reference: String, config: SessionConfig) -> Self {
        Self::with_clock(reference, config, SystemClock)
    }
}

impl<C: Clock> Session<C> {
    pub fn with_clock(reference: String, config: SessionConfig, clock: C) -> Self {
        let reference_len = reference.chars().count();
        let state = SessionState::fresh(&config);

        Self {
            reference,
            config,
            reference_len,
            state,
            clock,
            on_complete: None,
        }
    }

    /// Registers the callback fired once when the session finishes
    pub fn on_complete(mut self, callback: impl FnMut(&Metrics) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn input(&self) -> &[char] {
        &self.state.input
    }

    pub fn typed(&self) -> String {
        self.state.input.iter().collect()
    }

    pub fn cursor_pos(&self) -> usize {
        self.state.input.len()
    }

    pub fn seconds_remaining(&self) -> Option<u64> {
        self.state.seconds_remaining
    }

    pub fn active_secs(&self) -> u64 {
        self.state.active_secs
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.state.metrics.as_ref()
    }

    pub fn has_started(&self) -> bool {
        self.state.status != SessionStatus::Idle
    }

    pub fn has_finished(&self) -> bool {
        self.state.status == SessionStatus::Finished
    }

    pub fn is_paused(&self) -> bool {
        self.state.status == SessionStatus::Paused
    }

    pub fn char_states(&self) -> Vec<CharState> {
        metrics::char_states(&self.reference, &self.typed())
    }

    fn elapsed_secs(&self) -> u64 {
        metrics::elapsed_secs_for(
            self.config.mode,
            self.config.duration_secs().unwrap_or(0),
            self.state.seconds_remaining.unwrap_or(0),
            self.state.active_secs,
        )
    }

    /// Metrics for the input typed so far, without finishing
    pub fn live_metrics(&self) -> Metrics {
        metrics::compute_metrics(&self.reference, &self.typed(), self.elapsed_secs())
    }

    /// Records an input event: starts the clock or resumes from pause
    fn touch(&mut self) {
        let now = self.clock.now();
        self.state.last_input_at = Some(now);

        match self.state.status {
            SessionStatus::Idle => {
                self.state.started_at = Some(now);
                self.state.status = SessionStatus::Active;
                debug!("session started ({} {})", self.config.limit, self.config.mode);
            }
            SessionStatus::Paused => {
                self.state.status = SessionStatus::Active;
                debug!("session resumed by input");
            }
            SessionStatus::Active | SessionStatus::Finished => {}
        }
    }

    fn finish_if_complete(&mut self) {
        if self.state.input.len() >= self.reference_len {
            self.finish();
        }
    }

    pub fn write(&mut self, c: char) -> SessionStatus {
        if self.has_finished() {
            return self.state.status;
        }

        self.touch();

        self.state.input.push(c);

        self.finish_if_complete();
        self.state.status
    }

    pub fn backspace(&mut self) -> SessionStatus {
        if self.has_finished() || self.state.input.is_empty() {
            return self.state.status;
        }

        self.touch();
        self.state.input.pop();
        self.state.status
    }

    /// Replaces the whole typed value, like a text field change
    pub fn set_input(&mut self, value: &str) -> SessionStatus {
        if self.has_finished() {
            return self.state.status;
        }

        self.touch();

        self.state.input = value.chars().collect();

        self.finish_if_complete();
        self.state.status
    }

    /// Leaves the paused state without typing
    pub fn resume(&mut self) {
        if self.state.status == SessionStatus::Paused {
            self.state.last_input_at = Some(self.clock.now());
            self.state.status = SessionStatus::Active;
            debug!("session resumed");
        }
    }

    /// Advances the session by one second.
    ///
    /// Only an active session reacts. Inactivity is checked first; a tick
    /// that pauses the session does not move the clock.
    pub fn on_tick(&mut self) -> SessionStatus {
        if self.state.status != SessionStatus::Active {
            return self.state.status;
        }

        let now = self.clock.now();
        let idle_for = self
            .state
            .last_input_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();

        if idle_for >= Duration::from_secs(self.config.idle_timeout_secs) {
            self.state.status = SessionStatus::Paused;
            debug!("session paused after {}s without input", idle_for.as_secs());
            return self.state.status;
        }

        self.state.active_secs += 1;

        if let Some(remaining) = self.state.seconds_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.finish();
            }
        }

        self.state.status
    }

    /// Moves the session into `Finished`.
    ///
    /// Returns false if the session had already finished; metrics and the
    /// completion callback happen only on the first call.
    pub fn finish(&mut self) -> bool {
        if self.has_finished() {
            return false;
        }

        let metrics = self.live_metrics();
        self.state.status = SessionStatus::Finished;
        self.state.metrics = Some(metrics);

        info!(
            "session finished: {} wpm, {:.1}% accuracy ({} {})",
            metrics.wpm, metrics.accuracy, self.config.limit, self.config.mode
        );

        if let Some(callback) = self.on_complete.as_mut() {
            callback(&metrics);
        }

        true
    }

    /// Back to `Idle` with the same reference text
    pub fn restart(&mut self) {
        self.state = SessionState::fresh(&self.config);
        debug!("session restarted");
    }
}

impl<C: Clock> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("reference", &self.reference)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
