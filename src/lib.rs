// Library surface for the binary, headless integration tests and reuse.
pub mod api;
pub mod app_dirs;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod sentences;
pub mod session;
pub mod stats;
pub mod store;
pub mod ui;
pub mod util;
