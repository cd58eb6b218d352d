//! HS256 bearer tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stratus_core::ports::{AuthError, TokenClaims, TokenService};

const DEV_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
    pub issuer: String,
    /// Clock skew tolerated when checking `exp`.
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: DEV_SECRET.to_string(),
            expiration_hours: 24,
            issuer: "stratus-api".to_string(),
            leeway_secs: 60,
        }
    }
}

impl JwtConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|s| s.parse().ok())
        }

        let secret = std::env::var("JWT_SECRET").unwrap_or(defaults.secret);
        if secret == DEV_SECRET {
            tracing::warn!("JWT_SECRET not set; using the development secret");
        }

        Self {
            secret,
            expiration_hours: parsed("JWT_EXPIRATION_HOURS").unwrap_or(defaults.expiration_hours),
            issuer: std::env::var("JWT_ISSUER").unwrap_or(defaults.issuer),
            leeway_secs: parsed("JWT_LEEWAY_SECS").unwrap_or(defaults.leeway_secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    email: String,
    iss: String,
    iat: i64,
    exp: i64,
}

pub struct JwtTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    lifetime: chrono::TimeDelta,
}

impl JwtTokenService {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = config.leeway_secs;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer,
            lifetime: chrono::TimeDelta::hours(config.expiration_hours),
        }
    }

    pub fn from_env() -> Self {
        Self::new(JwtConfig::from_env())
    }

    /// Token lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime.to_std().unwrap_or_default()
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, user_id: Uuid, email: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        self.sign(&Claims {
            sub: user_id,
            email: email.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        })
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        let expires_at = DateTime::from_timestamp(data.claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("exp out of range".to_string()))?;

        Ok(TokenClaims {
            user_id: data.claims.sub,
            email: data.claims.email,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(issuer: &str) -> JwtTokenService {
        JwtTokenService::new(JwtConfig {
            secret: "test-secret".to_string(),
            expiration_hours: 1,
            issuer: issuer.to_string(),
            leeway_secs: 0,
        })
    }

    #[test]
    fn test_issued_token_verifies() {
        let service = service("stratus-test");
        let user_id = Uuid::new_v4();

        let token = service.issue(user_id, "billing@example.com").unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "billing@example.com");
        assert!(claims.expires_at > Utc::now());
        assert_eq!(service.lifetime(), Duration::from_secs(3600));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            service("stratus-test").verify("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_foreign_issuer_is_rejected() {
        let token = service("someone-else").issue(Uuid::new_v4(), "a@example.com").unwrap();

        assert!(service("stratus-test").verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = service("stratus-test");
        let now = Utc::now().timestamp();
        let token = service
            .sign(&Claims {
                sub: Uuid::new_v4(),
                email: "billing@example.com".to_string(),
                iss: "stratus-test".to_string(),
                iat: now - 3720,
                exp: now - 120,
            })
            .unwrap();

        assert!(matches!(service.verify(&token), Err(AuthError::TokenExpired)));
    }
}
