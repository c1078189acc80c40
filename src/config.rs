//! Runtime settings
//!
//! Loaded from the environment (after `dotenv`), every field has a default
//! so the service starts fully offline.

use rand::RngCore;
use std::env;
use std::str::FromStr;
use tracing::warn;

/// How a confirm-time OTP satisfies the MFA gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaOtpPolicy {
    /// Any non-empty OTP passes
    PresenceOnly,
    /// OTP must equal the live session OTP
    MatchSessionOtp,
}

impl FromStr for MfaOtpPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "presence" | "presence_only" => Ok(MfaOtpPolicy::PresenceOnly),
            "match" | "match_session_otp" => Ok(MfaOtpPolicy::MatchSessionOtp),
            other => Err(format!("unknown MFA OTP policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_minutes: i64,
    pub otp_ttl_minutes: i64,
    pub otp_length: usize,
    pub voice_similarity_threshold: f64,
    pub mfa_required_amount: f64,
    pub mfa_otp_policy: MfaOtpPolicy,
    pub allow_overdraft: bool,
    pub reminder_lookahead_minutes: i64,
    pub external_timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub whisper_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub nlu_api_url: Option<String>,
    pub database_url: Option<String>,
    pub seed_demo_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Voice Banking Assistant".to_string(),
            port: 8000,
            jwt_secret: random_secret(),
            access_token_ttl_minutes: 10,
            refresh_token_ttl_minutes: 1440,
            otp_ttl_minutes: 5,
            otp_length: 6,
            voice_similarity_threshold: 0.8,
            mfa_required_amount: 10_000.0,
            mfa_otp_policy: MfaOtpPolicy::MatchSessionOtp,
            allow_overdraft: false,
            reminder_lookahead_minutes: 5,
            external_timeout_secs: 15,
            openai_api_key: None,
            whisper_model: "whisper-1".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            nlu_api_url: None,
            database_url: None,
            seed_demo_data: true,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let jwt_secret = match non_empty("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using an ephemeral signing secret");
                defaults.jwt_secret
            }
        };

        Self {
            app_name: non_empty("APP_NAME").unwrap_or(defaults.app_name),
            port: non_empty("PORT")
                .or_else(|| non_empty("API_PORT"))
                .and_then(|v| parse_or_warn("PORT", &v))
                .unwrap_or(defaults.port),
            jwt_secret,
            access_token_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES")
                .unwrap_or(defaults.access_token_ttl_minutes),
            refresh_token_ttl_minutes: parsed("REFRESH_TOKEN_TTL_MINUTES")
                .unwrap_or(defaults.refresh_token_ttl_minutes),
            otp_ttl_minutes: parsed("OTP_TTL_MINUTES").unwrap_or(defaults.otp_ttl_minutes),
            otp_length: parsed("OTP_LENGTH").unwrap_or(defaults.otp_length),
            voice_similarity_threshold: parsed("VOICE_SIMILARITY_THRESHOLD")
                .unwrap_or(defaults.voice_similarity_threshold),
            mfa_required_amount: parsed("MFA_REQUIRED_AMOUNT")
                .unwrap_or(defaults.mfa_required_amount),
            mfa_otp_policy: parsed("MFA_OTP_POLICY").unwrap_or(defaults.mfa_otp_policy),
            allow_overdraft: parsed("ALLOW_OVERDRAFT").unwrap_or(defaults.allow_overdraft),
            reminder_lookahead_minutes: parsed("REMINDER_LOOKAHEAD_MINUTES")
                .unwrap_or(defaults.reminder_lookahead_minutes),
            external_timeout_secs: parsed("EXTERNAL_TIMEOUT_SECS")
                .unwrap_or(defaults.external_timeout_secs),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            whisper_model: non_empty("OPENAI_WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            elevenlabs_api_key: non_empty("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: non_empty("ELEVENLABS_VOICE_ID")
                .unwrap_or(defaults.elevenlabs_voice_id),
            nlu_api_url: non_empty("NLU_API_URL"),
            database_url: non_empty("POSTGRES_URL").or_else(|| non_empty("DATABASE_URL")),
            seed_demo_data: parsed("SEED_DEMO_DATA").unwrap_or(defaults.seed_demo_data),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    non_empty(key).and_then(|v| parse_or_warn(key, &v))
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value, "Ignoring unparsable setting");
            None
        }
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
