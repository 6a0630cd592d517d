//! Request handlers for accounts, results, stats and the leaderboard.
//!
//! Handlers are transport-agnostic: they take the `Authorization` header value
//! and a JSON body, and return an [`ApiResponse`]. Validation and credential
//! checks happen here, before anything reaches the aggregation code.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{self, Claims, TokenSigner};
use crate::error::{ApiError, ApiResponse};
use crate::leaderboard::{self, DEFAULT_LIMIT};
use crate::session::TestMode;
use crate::stats;
use crate::store::{NewTestResult, NewUser, ResultStore, StoreError};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Query parameters of the leaderboard endpoint, as received
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    pub mode: Option<String>,
    pub limit: Option<String>,
}

impl LeaderboardQuery {
    pub fn new(mode: TestMode, limit: usize) -> Self {
        Self {
            mode: Some(mode.to_string()),
            limit: Some(limit.to_string()),
        }
    }
}

fn required_str<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn count_field(body: &Value, field: &str) -> Result<u32, ApiError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ApiError::validation("Invalid test result data")),
    }
}

pub struct Api<S: ResultStore> {
    store: Arc<S>,
    signer: TokenSigner,
}

impl<S: ResultStore> Api<S> {
    pub fn new(store: Arc<S>, signer: TokenSigner) -> Self {
        Self { store, signer }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<Claims, ApiError> {
        let token = auth::bearer_token(authorization)?;
        Ok(self.signer.verify(token, Utc::now())?)
    }

    /// Creates an account: `{name, email, password}`
    pub fn sign_up(&self, body: &Value) -> ApiResponse {
        self.try_sign_up(body).into()
    }

    fn try_sign_up(&self, body: &Value) -> Result<ApiResponse, ApiError> {
        let (Some(name), Some(email), Some(password)) = (
            required_str(body, "name"),
            required_str(body, "email"),
            body.get("password").and_then(Value::as_str).filter(|p| !p.is_empty()),
        ) else {
            return Err(ApiError::validation("All fields are required"));
        };

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let duplicate = || ApiError::Conflict("User already exists with this email".to_string());

        if self.store.user_by_email(email)?.is_some() {
            return Err(duplicate());
        }

        let user = self
            .store
            .create_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash: auth::hash_password(password)?,
            })
            .map_err(|e| match e {
                StoreError::Conflict { .. } => duplicate(),
                e => e.into(),
            })?;

        info!("created user {} <{}>", user.id, user.email);

        Ok(ApiResponse::created(json!({
            "message": "User created successfully",
            "userId": user.id,
        })))
    }

    /// Exchanges `{email, password}` for a bearer token
    pub fn login(&self, body: &Value) -> ApiResponse {
        self.try_login(body).into()
    }

    fn try_login(&self, body: &Value) -> Result<ApiResponse, ApiError> {
        let (Some(email), Some(password)) = (
            required_str(body, "email"),
            body.get("password").and_then(Value::as_str),
        ) else {
            return Err(ApiError::validation("Email and password are required"));
        };

        let user = self
            .store
            .user_by_email(email)?
            .ok_or(ApiError::Auth(auth::AuthError::InvalidCredentials))?;

        auth::verify_password(password, &user.password_hash)?;

        let token = self.signer.issue(&user, Utc::now())?;
        info!("user {} logged in", user.id);

        Ok(ApiResponse::ok(json!({
            "token": token,
            "user": user,
        })))
    }

    /// Stores a finished test for the authenticated user
    pub fn submit_result(&self, authorization: Option<&str>, body: &Value) -> ApiResponse {
        self.try_submit_result(authorization, body).into()
    }

    fn try_submit_result(
        &self,
        authorization: Option<&str>,
        body: &Value,
    ) -> Result<ApiResponse, ApiError> {
        let claims = self.authenticate(authorization)?;

        let invalid = || ApiError::validation("Invalid test result data");

        let wpm = body.get("wpm").and_then(Value::as_f64).ok_or_else(invalid)?;
        let accuracy = body
            .get("accuracy")
            .and_then(Value::as_f64)
            .ok_or_else(invalid)?;

        if wpm < 0.0 || !(0.0..=100.0).contains(&accuracy) {
            return Err(invalid());
        }

        let mode = body
            .get("mode")
            .and_then(Value::as_str)
            .and_then(|m| m.parse::<TestMode>().ok())
            .ok_or_else(invalid)?;
        let limit = body
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|l| u32::try_from(l).ok())
            .filter(|l| *l > 0)
            .ok_or_else(invalid)?;

        let result = self.store.insert_result(NewTestResult {
            user_id: claims.user_id,
            wpm: wpm.round() as u32,
            accuracy,
            correct_chars: count_field(body, "correctChars")?,
            incorrect_chars: count_field(body, "incorrectChars")?,
            mode,
            limit,
            completed_at: Utc::now(),
        })?;

        info!(
            "saved result {} for user {}: {} wpm",
            result.id, claims.user_id, result.wpm
        );

        Ok(ApiResponse::created(json!({
            "message": "Test result saved successfully",
            "resultId": result.id,
        })))
    }

    /// Statistics over every result of the authenticated user
    pub fn my_stats(&self, authorization: Option<&str>) -> ApiResponse {
        self.try_my_stats(authorization).into()
    }

    fn try_my_stats(&self, authorization: Option<&str>) -> Result<ApiResponse, ApiError> {
        let claims = self.authenticate(authorization)?;
        let results = self.store.results_for_user(claims.user_id)?;
        let stats = stats::user_stats(results);

        let body = serde_json::to_value(stats).map_err(|e| ApiError::Internal(Box::new(e)))?;
        Ok(ApiResponse::ok(body))
    }

    /// Every stored result of the authenticated user, newest first
    pub fn my_results(&self, authorization: Option<&str>) -> ApiResponse {
        self.try_my_results(authorization).into()
    }

    fn try_my_results(&self, authorization: Option<&str>) -> Result<ApiResponse, ApiError> {
        let claims = self.authenticate(authorization)?;
        let mut results = self.store.results_for_user(claims.user_id)?;
        results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));

        Ok(ApiResponse::ok(json!({ "results": results })))
    }

    /// Public ranking for one mode
    pub fn leaderboard(&self, query: &LeaderboardQuery) -> ApiResponse {
        match self.try_leaderboard(query) {
            Ok(response) => response,
            Err(err) => {
                warn!("leaderboard query failed: {err:?}");
                ApiResponse::error(500, "Failed to fetch leaderboard")
            }
        }
    }

    fn try_leaderboard(&self, query: &LeaderboardQuery) -> Result<ApiResponse, ApiError> {
        let limit = query
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .max(1);

        let mode = match query.mode.as_deref() {
            None | Some("") => TestMode::default(),
            Some(raw) => match raw.parse::<TestMode>() {
                Ok(mode) => mode,
                // nothing is ever stored under an unknown mode
                Err(_) => return Ok(ApiResponse::ok(json!({ "leaderboard": [] }))),
            },
        };

        let results = self.store.results_for_mode(mode)?;
        let users = self.store.users()?;
        let board = leaderboard::build_leaderboard(&results, &users, mode, limit);

        Ok(ApiResponse::ok(json!({ "leaderboard": board })))
    }
}
