use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, rngs::OsRng, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::store::{User, UserId};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    /// No bearer credential was presented
    #[error("Unauthorized")]
    Missing,
    #[error("Invalid token")]
    Malformed,
    #[error("Invalid token")]
    BadSignature,
    #[error("Invalid token")]
    Expired,
    /// Email or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("HashError: {0}")]
    Hash(String),
}

/// Identity carried by a bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    /// Expiry, seconds since the unix epoch
    pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Random secret suitable for [`TokenSigner`]
pub fn generate_secret() -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(48)
        .collect()
}

/// Extracts the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::Missing)?;
    let token = header.strip_prefix("Bearer ").ok_or(AuthError::Missing)?.trim();

    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token)
}

/// Issues and verifies HMAC-SHA256 signed tokens of the form
/// `base64url(claims json).base64url(signature)`.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl TokenSigner {
    pub const DEFAULT_LIFETIME_DAYS: i64 = 7;

    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            lifetime: Duration::days(Self::DEFAULT_LIFETIME_DAYS),
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AuthError::Hash(e.to_string()))
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            exp: (now + self.lifetime).timestamp(),
        };

        let payload = serde_json::to_vec(&claims).map_err(|e| AuthError::Hash(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user() -> User {
        User {
            id: 42,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter22").unwrap();

        assert_ne!(hash, "hunter22");
        assert!(hash.starts_with("$argon2"));
        assert_eq!(verify_password("hunter22", &hash), Ok(()));
        assert_eq!(
            verify_password("hunter23", &hash),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = TokenSigner::new("secret");
        let now = Utc::now();
        let token = signer.issue(&user(), now).unwrap();

        let claims = signer.verify(&token, now).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.name, "Ada");
    }

    #[test]
    fn test_expired_token() {
        let signer = TokenSigner::new("secret").with_lifetime(Duration::minutes(5));
        let now = Utc::now();
        let token = signer.issue(&user(), now).unwrap();

        assert_matches!(signer.verify(&token, now + Duration::minutes(4)), Ok(_));
        assert_matches!(
            signer.verify(&token, now + Duration::minutes(6)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenSigner::new("secret").issue(&user(), Utc::now()).unwrap();

        assert_matches!(
            TokenSigner::new("other").verify(&token, Utc::now()),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.issue(&user(), Utc::now()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged = URL_SAFE_NO_PAD.encode(
            r#"{"userId":1,"email":"root@example.com","name":"root","exp":99999999999}"#,
        );
        assert_matches!(
            signer.verify(&format!("{forged}.{signature}"), Utc::now()),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_malformed_token() {
        let signer = TokenSigner::new("secret");
        assert_matches!(signer.verify("garbage", Utc::now()), Err(AuthError::Malformed));
        assert_matches!(signer.verify("a.!!!", Utc::now()), Err(AuthError::Malformed));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Ok("abc.def"));
        assert_eq!(bearer_token(None), Err(AuthError::Missing));
        assert_eq!(bearer_token(Some("Basic abc")), Err(AuthError::Missing));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::Missing));
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        assert_eq!(a.len(), 48);
        assert_ne!(a, generate_secret());
    }
}
