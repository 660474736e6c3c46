//! JWT session tokens
//!
//! Tokens are HS256 signed and carry the user id in `sub`. A verified token is
//! not enough on its own: the auth gate also resolves `sub` to a stored user.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::MIN_JWT_SECRET_LEN;
use crate::error::WelltickError;

/// Default lifetime of an issued token (7 days)
pub const DEFAULT_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Payload stored in a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Email at issue time
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT issuer and validator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("secret", &"<redacted>")
            .field("expiry_seconds", &self.expiry_seconds)
            .finish()
    }
}

impl JwtValidator {
    /// Create a validator. The secret must be at least 32 characters.
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, WelltickError> {
        if secret.is_empty() {
            return Err(WelltickError::Config(
                "JWT_SECRET is required unless dev mode is enabled".into(),
            ));
        }

        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(WelltickError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Validator with a fixed, public secret for local development
    pub fn new_dev(expiry_seconds: u64) -> Self {
        Self {
            secret: "welltick-dev-mode-secret-not-for-production".into(),
            expiry_seconds,
        }
    }

    /// Issue a token for a user
    pub fn generate_token(&self, user_id: &str, email: &str) -> Result<String, WelltickError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| WelltickError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| WelltickError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, WelltickError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Invalid token",
            };
            WelltickError::Unauthorized(message.into())
        })
    }
}

/// Extract token from an Authorization header.
/// Accepts "Bearer <token>" and a bare token.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            DEFAULT_EXPIRY_SECS,
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();
        let token = validator.generate_token("user-1", "sam@example.com").unwrap();

        let claims = validator.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "sam@example.com");
        assert_eq!(claims.exp - claims.iat, DEFAULT_EXPIRY_SECS);
    }

    #[test]
    fn test_invalid_and_foreign_tokens() {
        let validator = test_validator();
        assert!(matches!(
            validator.verify_token("not-a-token"),
            Err(WelltickError::Unauthorized(_))
        ));

        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            DEFAULT_EXPIRY_SECS,
        )
        .unwrap();
        let token = other.generate_token("user-1", "sam@example.com").unwrap();
        assert!(validator.verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let validator = test_validator();
        let claims = Claims {
            sub: "user-1".into(),
            email: "sam@example.com".into(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-that-is-at-least-32-characters-long"),
        )
        .unwrap();

        let err = validator.verify_token(&token).unwrap_err();
        assert_eq!(err.to_string(), "Token expired");
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 60).is_err());
        assert!(JwtValidator::new("".into(), 60).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 60).is_ok());
    }

    #[test]
    fn test_dev_validator_round_trips() {
        let validator = JwtValidator::new_dev(60);
        let token = validator.generate_token("u", "e@example.com").unwrap();
        assert!(validator.verify_token(&token).is_ok());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }
}
