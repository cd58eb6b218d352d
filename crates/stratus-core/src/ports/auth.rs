//! Caller identity port.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who is calling, as asserted by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies bearer tokens.
///
/// Verification must be cheap: it runs on every admitted request to derive
/// the per-user admission key.
pub trait TokenService: Send + Sync {
    fn issue(&self, user_id: Uuid, email: &str) -> Result<String, AuthError>;

    fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing authorization header")]
    MissingAuth,
}
