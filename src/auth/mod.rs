//! Authentication service
//!
//! Login → OTP → voice check → token issuance, plus voice enrollment,
//! refresh-token rotation and access-token resolution for requests.

use crate::error::BankingError;
use crate::models::{DialogueState, SessionRecord, TokenPair, User, VoiceCheck};
use crate::security::{constant_time_eq, hash_password, SecurityContext};
use crate::session::UserLocks;
use crate::store::BankStore;
use crate::voice::VoiceVerifier;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned by a successful password check. The OTP itself travels out of band.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginChallenge {
    pub user_id: String,
    pub otp_required: bool,
    pub otp_expires: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn BankStore>,
    security: Arc<SecurityContext>,
    voice: Arc<VoiceVerifier>,
    locks: Arc<UserLocks>,
    otp_ttl: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn BankStore>,
        security: Arc<SecurityContext>,
        voice: Arc<VoiceVerifier>,
        locks: Arc<UserLocks>,
        otp_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            security,
            voice,
            locks,
            otp_ttl: Duration::minutes(otp_ttl_minutes),
        }
    }

    /// Check the password, then issue a fresh OTP and reset the dialogue.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginChallenge> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .filter(|u| constant_time_eq(&u.password_hash, &hash_password(&u.user_id, password)))
            .ok_or_else(|| {
                warn!(username, "Rejected login");
                BankingError::AuthenticationFailed("invalid credentials".into())
            })?;

        let _guard = self.locks.lock(&user.user_id).await;
        let now = self.security.clock.now();
        let otp_expires = now + self.otp_ttl;

        let previous = self.store.load_session(&user.user_id).await?;
        let session = SessionRecord::for_login(
            &user.user_id,
            self.security.new_otp(),
            otp_expires,
            previous,
            now,
        );
        self.store.save_session(&session).await?;

        info!(user_id = %user.user_id, expires = %otp_expires, "OTP issued");

        Ok(LoginChallenge {
            user_id: user.user_id,
            otp_required: true,
            otp_expires,
        })
    }

    /// Voice check first, then the OTP. Both must pass.
    pub async fn issue_tokens(&self, user_id: &str, otp: &str, audio: &[u8]) -> Result<TokenPair> {
        if otp.trim().is_empty() {
            return Err(BankingError::ValidationFailed("OTP is required".into()));
        }
        if audio.is_empty() {
            return Err(BankingError::ValidationFailed(
                "voice sample is required".into(),
            ));
        }

        let _guard = self.locks.lock(user_id).await;

        let check = self.check_voice(user_id, audio, Some(otp)).await?;
        if !check.success {
            warn!(user_id, similarity = check.similarity, "Voice check failed at token issuance");
            return Err(BankingError::AuthenticationFailed(
                "voice verification failed".into(),
            ));
        }

        let now = self.security.clock.now();
        let session = self.store.load_session(user_id).await?;
        let otp_ok = session
            .as_ref()
            .map(|s| s.otp_matches(otp.trim(), now))
            .unwrap_or(false);
        if !otp_ok {
            warn!(user_id, "Invalid or expired OTP");
            return Err(BankingError::AuthenticationFailed(
                "invalid or expired OTP".into(),
            ));
        }

        let tokens = self.security.tokens.issue_tokens(user_id).await?;
        info!(user_id, "Tokens issued");
        Ok(tokens)
    }

    pub async fn enroll_voice(&self, user_id: &str, audio: &[u8]) -> Result<()> {
        if audio.is_empty() {
            return Err(BankingError::ValidationFailed(
                "voice sample is required".into(),
            ));
        }

        let embedding = self.voice.embed(audio);
        if !self.store.set_voice_embedding(user_id, &embedding).await? {
            return Err(BankingError::NotFound(format!("user {}", user_id)));
        }

        info!(user_id, dimension = embedding.len(), "Voice enrolled");
        Ok(())
    }

    /// Standalone voice check against the enrolled profile.
    pub async fn verify_voice(
        &self,
        user_id: &str,
        audio: &[u8],
        otp: Option<&str>,
    ) -> Result<VoiceCheck> {
        let _guard = self.locks.lock(user_id).await;
        self.check_voice(user_id, audio, otp).await
    }

    async fn check_voice(&self, user_id: &str, audio: &[u8], otp: Option<&str>) -> Result<VoiceCheck> {
        let user = self.store.find_user(user_id).await?;
        let enrolled = user
            .filter(User::has_voice_profile)
            .and_then(|u| u.voice_embedding)
            .ok_or_else(|| BankingError::VoiceProfileMissing(user_id.to_string()))?;

        let now = self.security.clock.now();
        let session = self.store.load_session(user_id).await?;
        let session_otp = session.as_ref().and_then(|s| s.live_otp(now));

        let check = self
            .voice
            .check(&enrolled, audio, otp.map(str::trim), session_otp);
        debug!(
            user_id,
            similarity = check.similarity,
            success = check.success,
            fallback_required = check.fallback_required,
            "Voice verified"
        );
        Ok(check)
    }

    /// Exchange a refresh token for a new pair. The old token is consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.security.tokens.refresh(refresh_token).await
    }

    /// Drop a refresh token so it can no longer be exchanged.
    pub async fn revoke(&self, refresh_token: &str) -> Result<()> {
        if self.security.tokens.revoke(refresh_token).await {
            info!("Refresh token revoked");
            Ok(())
        } else {
            Err(BankingError::UnknownToken)
        }
    }

    /// Resolve a bearer token to its user. Unknown subjects fail as unauthorized.
    pub async fn authenticate(&self, access_token: &str) -> Result<User> {
        let user_id = self.security.tokens.verify_access_token(access_token).await?;
        self.store
            .find_user(&user_id)
            .await?
            .ok_or_else(|| BankingError::AuthenticationFailed("unknown user".into()))
    }

    pub async fn session_state(&self, user_id: &str) -> Result<DialogueState> {
        self.store
            .load_session(user_id)
            .await?
            .map(|s| s.state)
            .ok_or_else(|| BankingError::SessionMissing(user_id.to_string()))
    }

    pub fn expires_in(&self) -> i64 {
        self.security.tokens.access_ttl_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Settings;
    use crate::security::FixedOtpGenerator;
    use crate::store::{seed_demo_data, InMemoryBankStore, DEMO_PASSWORD, DEMO_USERNAME, DEMO_USER_ID};

    const VOICE: &[u8] = b"enrolled voice sample";

    async fn service() -> (AuthService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store: Arc<dyn BankStore> = Arc::new(InMemoryBankStore::new());
        seed_demo_data(store.as_ref()).await.unwrap();

        let settings = Settings::default();
        let security = Arc::new(SecurityContext::new(
            &settings,
            Arc::new(FixedOtpGenerator::new("123456")),
            clock.clone(),
        ));
        let service = AuthService::new(
            store,
            security,
            Arc::new(VoiceVerifier::default()),
            Arc::new(UserLocks::new()),
            settings.otp_ttl_minutes,
        );
        (service, clock)
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password_and_unknown_user() {
        let (auth, _) = service().await;
        assert!(matches!(
            auth.login(DEMO_USERNAME, "wrong").await,
            Err(BankingError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            auth.login("nobody", DEMO_PASSWORD).await,
            Err(BankingError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_full_login_issues_verifiable_tokens() {
        let (auth, _) = service().await;
        auth.enroll_voice(DEMO_USER_ID, VOICE).await.unwrap();

        let challenge = auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
        assert_eq!(challenge.user_id, DEMO_USER_ID);
        assert!(challenge.otp_required);

        let tokens = auth.issue_tokens(DEMO_USER_ID, "123456", VOICE).await.unwrap();
        let user = auth.authenticate(&tokens.access_token).await.unwrap();
        assert_eq!(user.user_id, DEMO_USER_ID);
        assert_eq!(auth.expires_in(), 600);
    }

    #[tokio::test]
    async fn test_token_issuance_needs_voice_profile() {
        let (auth, _) = service().await;
        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
        assert!(matches!(
            auth.issue_tokens(DEMO_USER_ID, "123456", VOICE).await,
            Err(BankingError::VoiceProfileMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_otp_fails_even_with_matching_voice() {
        let (auth, _) = service().await;
        auth.enroll_voice(DEMO_USER_ID, VOICE).await.unwrap();
        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();

        assert!(matches!(
            auth.issue_tokens(DEMO_USER_ID, "000000", VOICE).await,
            Err(BankingError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_otp_fails() {
        let (auth, clock) = service().await;
        auth.enroll_voice(DEMO_USER_ID, VOICE).await.unwrap();
        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();

        clock.advance(Duration::minutes(6));
        assert!(matches!(
            auth.issue_tokens(DEMO_USER_ID, "123456", VOICE).await,
            Err(BankingError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_inputs_are_validation_errors() {
        let (auth, _) = service().await;
        assert!(matches!(
            auth.issue_tokens(DEMO_USER_ID, "", VOICE).await,
            Err(BankingError::ValidationFailed(_))
        ));
        assert!(matches!(
            auth.issue_tokens(DEMO_USER_ID, "123456", b"").await,
            Err(BankingError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_voice_fallback_paths() {
        let (auth, _) = service().await;
        auth.enroll_voice(DEMO_USER_ID, VOICE).await.unwrap();
        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();

        let no_otp = auth.verify_voice(DEMO_USER_ID, VOICE, None).await.unwrap();
        assert!(!no_otp.success);
        assert!(no_otp.fallback_required);

        let with_otp = auth.verify_voice(DEMO_USER_ID, VOICE, Some("123456")).await.unwrap();
        assert!(with_otp.success);
        assert!(!with_otp.fallback_required);
        assert!((with_otp.similarity - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_enroll_unknown_user() {
        let (auth, _) = service().await;
        assert!(matches!(
            auth.enroll_voice("ghost", VOICE).await,
            Err(BankingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_consumes_old_token() {
        let (auth, _) = service().await;
        auth.enroll_voice(DEMO_USER_ID, VOICE).await.unwrap();
        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
        let tokens = auth.issue_tokens(DEMO_USER_ID, "123456", VOICE).await.unwrap();

        let rotated = auth.refresh(&tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);
        assert!(matches!(
            auth.refresh(&tokens.refresh_token).await,
            Err(BankingError::UnknownToken)
        ));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_cannot_be_exchanged() {
        let (auth, _) = service().await;
        auth.enroll_voice(DEMO_USER_ID, VOICE).await.unwrap();
        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
        let tokens = auth.issue_tokens(DEMO_USER_ID, "123456", VOICE).await.unwrap();

        auth.revoke(&tokens.refresh_token).await.unwrap();
        assert!(matches!(
            auth.refresh(&tokens.refresh_token).await,
            Err(BankingError::UnknownToken)
        ));
        assert!(matches!(
            auth.revoke(&tokens.refresh_token).await,
            Err(BankingError::UnknownToken)
        ));
    }

    #[tokio::test]
    async fn test_session_state_after_login() {
        let (auth, _) = service().await;
        assert!(matches!(
            auth.session_state(DEMO_USER_ID).await,
            Err(BankingError::SessionMissing(_))
        ));

        auth.login(DEMO_USERNAME, DEMO_PASSWORD).await.unwrap();
        let state = auth.session_state(DEMO_USER_ID).await.unwrap();
        assert_eq!(state.user_id, DEMO_USER_ID);
        assert!(state.dialog_trace.is_empty());
    }
}
