use crate::error::AppError;
use crate::models::Claims;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};

/// bcrypt work factor used for every stored password.
pub const HASH_COST: u32 = 10;

pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash(password, HASH_COST))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))
}

/// Signs and checks the bearer tokens handed out on login.
///
/// The key is fixed for the lifetime of the process.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, id: u64, name: &str) -> Result<String, AppError> {
        self.issue_at(id, name, Utc::now())
    }

    pub fn issue_at(&self, id: u64, name: &str, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("token expiry out of range".to_string()))?;
        let claims = Claims {
            id,
            name: name.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        match jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AppError::ExpiredToken),
                _ => Err(AppError::InvalidToken),
            },
        }
    }

    /// Verifies the raw `Authorization` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Claims, AppError> {
        let value = match header {
            Some(v) => v.trim(),
            None => return Err(AppError::MissingToken),
        };
        if value.is_empty() {
            return Err(AppError::MissingToken);
        }

        let token = match value.strip_prefix("Bearer") {
            Some(rest) if rest.is_empty() => return Err(AppError::MissingToken),
            Some(rest) if rest.starts_with(' ') => rest.trim(),
            _ => return Err(AppError::InvalidToken),
        };
        if token.is_empty() {
            return Err(AppError::MissingToken);
        }

        self.verify(token)
    }
}

/// Extractor for routes that require a verified bearer token.
#[derive(Debug)]
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let result = match parts.headers.get(header::AUTHORIZATION) {
            None => state.tokens.verify_header(None),
            Some(value) => match value.to_str() {
                Ok(value) => state.tokens.verify_header(Some(value)),
                Err(_) => Err(AppError::InvalidToken),
            },
        };

        match result {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(e) => {
                tracing::warn!("Rejected request to {}: {}", parts.uri.path(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new("test-jwt-secret", Duration::hours(1))
    }

    #[tokio::test]
    async fn test_password_hash_and_verify_correct() {
        let hash = hash_password("my-secure-password").await.unwrap();
        assert!(verify_password("my-secure-password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_password_verify_wrong() {
        let hash = hash_password("correct-password").await.unwrap();
        assert!(!verify_password("wrong-password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_password_different_salts() {
        let hash1 = hash_password("same-password").await.unwrap();
        let hash2 = hash_password("same-password").await.unwrap();
        assert_ne!(hash1, hash2);
        assert!(hash1.starts_with("$2b$10$"));
    }

    #[tokio::test]
    async fn test_verify_against_garbage_hash_is_false() {
        assert!(!verify_password("pw", "not-a-bcrypt-hash").await.unwrap());
    }

    #[test]
    fn test_token_issue_and_verify() {
        let tokens = authority();
        let token = tokens.issue(7, "ana").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.name, "ana");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_expired_after_ttl() {
        let tokens = authority();
        let token = tokens
            .issue_at(7, "ana", Utc::now() - Duration::hours(1) - Duration::seconds(5))
            .unwrap();
        assert!(matches!(tokens.verify(&token), Err(AppError::ExpiredToken)));
    }

    #[test]
    fn test_token_expiry_overflow_is_error() {
        let tokens = TokenAuthority::new("s", Duration::try_seconds(i64::MAX / 1000).unwrap());
        assert!(matches!(tokens.issue(1, "ana"), Err(AppError::Internal(_))));
    }

    #[test]
    fn test_token_wrong_secret_is_invalid() {
        let token = TokenAuthority::new("secret-1", Duration::hours(1))
            .issue(1, "ana")
            .unwrap();
        let other = TokenAuthority::new("secret-2", Duration::hours(1));
        assert!(matches!(other.verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_token_malformed_is_invalid() {
        assert!(matches!(
            authority().verify("not.a.jwt"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_header_parsing() {
        let tokens = authority();
        let token = tokens.issue(1, "ana").unwrap();

        assert!(matches!(tokens.verify_header(None), Err(AppError::MissingToken)));
        assert!(matches!(tokens.verify_header(Some("")), Err(AppError::MissingToken)));
        assert!(matches!(
            tokens.verify_header(Some("Bearer ")),
            Err(AppError::MissingToken)
        ));
        assert!(matches!(
            tokens.verify_header(Some(format!("Basic {token}").as_str())),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            tokens.verify_header(Some(token.as_str())),
            Err(AppError::InvalidToken)
        ));
        let claims = tokens.verify_header(Some(format!("Bearer {token}").as_str())).unwrap();
        assert_eq!(claims.id, 1);
    }
}
