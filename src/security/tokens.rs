//! Access and refresh token issuance
//!
//! Access tokens are stateless HS256 JWTs. Refresh tokens are JWTs too, but
//! their validity is decided by the process-wide registry mapping
//! token → expiry, so they can be consumed or revoked independently of
//! the embedded claim.

use crate::clock::Clock;
use crate::error::BankingError;
use crate::models::TokenPair;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    exp: i64,
    iat: i64,
    jti: String,
    #[serde(rename = "type")]
    kind: TokenKind,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct TokenService {
    keys: RwLock<SigningKeys>,
    refresh_tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        access_ttl_minutes: i64,
        refresh_ttl_minutes: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys: RwLock::new(SigningKeys::from_secret(secret)),
            refresh_tokens: RwLock::new(HashMap::new()),
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::minutes(refresh_ttl_minutes),
            clock,
        }
    }

    /// Issue an access/refresh pair for `user_id` and register the refresh token.
    pub async fn issue_tokens(&self, user_id: &str) -> Result<TokenPair> {
        let now = self.clock.now();
        let refresh_expires = now + self.refresh_ttl;

        // Registry before keys, the same order as `refresh` and `rotate_secret`.
        let mut registry = self.refresh_tokens.write().await;
        let (access_token, refresh_token) = {
            let keys = self.keys.read().await;
            let access = sign(&keys, user_id, now, now + self.access_ttl, TokenKind::Access)?;
            let refresh = sign(&keys, user_id, now, refresh_expires, TokenKind::Refresh)?;
            (access, refresh)
        };

        // Expired entries linger for one more lifetime so they still report as expired.
        let prune_before = now - self.refresh_ttl;
        registry.retain(|_, expires| *expires > prune_before);
        registry.insert(refresh_token.clone(), refresh_expires);

        debug!(user_id, registered = registry.len(), "Issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token and return its subject.
    pub async fn verify_access_token(&self, token: &str) -> Result<String> {
        let claims = self.decode_claims(token).await?;
        if claims.kind != TokenKind::Access {
            return Err(BankingError::TokenInvalid("not an access token".into()));
        }
        let sub = subject(&claims)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(BankingError::TokenExpired);
        }
        Ok(sub)
    }

    /// Verify a refresh token against the registry and return its subject.
    pub async fn verify_refresh_token(&self, token: &str) -> Result<String> {
        let expires = {
            let registry = self.refresh_tokens.read().await;
            registry.get(token).copied().ok_or(BankingError::UnknownToken)?
        };
        self.check_refresh(token, expires).await
    }

    /// Consume a refresh token and issue a fresh pair.
    pub async fn refresh(&self, token: &str) -> Result<TokenPair> {
        let user_id = {
            let mut registry = self.refresh_tokens.write().await;
            let expires = registry.get(token).copied().ok_or(BankingError::UnknownToken)?;
            let user_id = self.check_refresh(token, expires).await?;
            registry.remove(token);
            user_id
        };
        info!(user_id = %user_id, "Rotating refresh token");
        self.issue_tokens(&user_id).await
    }

    /// Drop a refresh token from the registry. Returns whether it was known.
    pub async fn revoke(&self, token: &str) -> bool {
        self.refresh_tokens.write().await.remove(token).is_some()
    }

    /// Replace the signing secret. Every outstanding token becomes invalid.
    pub async fn rotate_secret(&self, secret: &[u8]) {
        let mut registry = self.refresh_tokens.write().await;
        let mut keys = self.keys.write().await;
        *keys = SigningKeys::from_secret(secret);
        registry.clear();
        info!("Signing secret rotated; refresh registry cleared");
    }

    pub async fn registered_refresh_tokens(&self) -> usize {
        self.refresh_tokens.read().await.len()
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    async fn check_refresh(&self, token: &str, expires: DateTime<Utc>) -> Result<String> {
        let claims = self.decode_claims(token).await?;
        if claims.kind != TokenKind::Refresh {
            return Err(BankingError::TokenInvalid("not a refresh token".into()));
        }
        let sub = subject(&claims)?;
        if self.clock.now() > expires {
            return Err(BankingError::TokenExpired);
        }
        Ok(sub)
    }

    async fn decode_claims(&self, token: &str) -> Result<Claims> {
        // Expiry is checked against the injected clock, not the system time.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        let keys = self.keys.read().await;
        decode::<Claims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| BankingError::TokenInvalid(e.to_string()))
    }
}

fn sign(
    keys: &SigningKeys,
    user_id: &str,
    issued: DateTime<Utc>,
    expires: DateTime<Utc>,
    kind: TokenKind,
) -> Result<String> {
    let claims = Claims {
        sub: Some(user_id.to_string()),
        exp: expires.timestamp(),
        iat: issued.timestamp(),
        jti: Uuid::new_v4().to_string(),
        kind,
    };
    encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
        .map_err(|e| BankingError::Internal(format!("token signing failed: {}", e)))
}

fn subject(claims: &Claims) -> Result<String> {
    claims
        .sub
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BankingError::TokenInvalid("missing subject".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TEST_SECRET: &[u8] = b"unit-test-signing-secret";

    fn service() -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let svc = TokenService::new(TEST_SECRET, 10, 60, clock.clone());
        (svc, clock)
    }

    #[tokio::test]
    async fn test_access_round_trip() {
        let (svc, _) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        assert_eq!(svc.verify_access_token(&pair.access_token).await.unwrap(), "user_001");
    }

    #[tokio::test]
    async fn test_access_expires_with_clock() {
        let (svc, clock) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        clock.advance(Duration::minutes(11));
        assert!(matches!(
            svc.verify_access_token(&pair.access_token).await,
            Err(BankingError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_tampered_and_foreign_tokens_rejected() {
        let (svc, clock) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.push('x');
        assert!(matches!(
            svc.verify_access_token(&tampered).await,
            Err(BankingError::TokenInvalid(_))
        ));

        let other = TokenService::new(b"another-secret", 10, 60, clock);
        assert!(matches!(
            other.verify_access_token(&pair.access_token).await,
            Err(BankingError::TokenInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_subject_rejected() {
        let (svc, clock) = service();
        let claims = Claims {
            sub: None,
            exp: (clock.now() + Duration::minutes(5)).timestamp(),
            iat: clock.now().timestamp(),
            jti: "x".into(),
            kind: TokenKind::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET),
        )
        .unwrap();
        assert!(matches!(
            svc.verify_access_token(&token).await,
            Err(BankingError::TokenInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_token_kinds_not_interchangeable() {
        let (svc, _) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        assert!(svc.verify_access_token(&pair.refresh_token).await.is_err());
        assert!(matches!(
            svc.verify_refresh_token(&pair.access_token).await,
            Err(BankingError::UnknownToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_registry_lifecycle() {
        let (svc, clock) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        assert_eq!(svc.verify_refresh_token(&pair.refresh_token).await.unwrap(), "user_001");

        assert!(matches!(
            svc.verify_refresh_token("never-issued").await,
            Err(BankingError::UnknownToken)
        ));

        clock.advance(Duration::minutes(61));
        assert!(matches!(
            svc.verify_refresh_token(&pair.refresh_token).await,
            Err(BankingError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_survives_later_issuance() {
        let (svc, clock) = service();
        let stale = svc.issue_tokens("user_001").await.unwrap();

        clock.advance(Duration::minutes(61));
        svc.issue_tokens("user_002").await.unwrap();

        assert!(matches!(
            svc.verify_refresh_token(&stale.refresh_token).await,
            Err(BankingError::TokenExpired)
        ));
        for _ in 0..2 {
            assert!(matches!(
                svc.refresh(&stale.refresh_token).await,
                Err(BankingError::TokenExpired)
            ));
        }

        clock.advance(Duration::minutes(61));
        svc.issue_tokens("user_002").await.unwrap();
        assert!(matches!(
            svc.verify_refresh_token(&stale.refresh_token).await,
            Err(BankingError::UnknownToken)
        ));
    }

    #[tokio::test]
    async fn test_rotate_secret_concurrent_with_issuance() {
        let (svc, _) = service();
        let svc = Arc::new(svc);

        let issuer = {
            let svc = svc.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    svc.issue_tokens("user_001").await.unwrap();
                }
            })
        };
        svc.rotate_secret(b"rotated-secret").await;
        issuer.await.unwrap();

        let registered: Vec<String> = svc.refresh_tokens.read().await.keys().cloned().collect();
        for token in registered {
            assert_eq!(svc.verify_refresh_token(&token).await.unwrap(), "user_001");
        }
    }

    #[tokio::test]
    async fn test_refresh_consumes_token() {
        let (svc, _) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        let rotated = svc.refresh(&pair.refresh_token).await.unwrap();

        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert!(matches!(
            svc.refresh(&pair.refresh_token).await,
            Err(BankingError::UnknownToken)
        ));
        assert_eq!(svc.verify_access_token(&rotated.access_token).await.unwrap(), "user_001");
    }

    #[tokio::test]
    async fn test_rotate_secret_invalidates_everything() {
        let (svc, _) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        svc.rotate_secret(b"rotated-secret").await;

        assert!(svc.verify_access_token(&pair.access_token).await.is_err());
        assert!(matches!(
            svc.verify_refresh_token(&pair.refresh_token).await,
            Err(BankingError::UnknownToken)
        ));
        assert_eq!(svc.registered_refresh_tokens().await, 0);
    }

    #[tokio::test]
    async fn test_revoke() {
        let (svc, _) = service();
        let pair = svc.issue_tokens("user_001").await.unwrap();
        assert!(svc.revoke(&pair.refresh_token).await);
        assert!(!svc.revoke(&pair.refresh_token).await);
    }
}
