//! Security context
//!
//! Owns the token service (signing secret + refresh registry), the OTP
//! generator and the clock. Built once at startup and handed to the
//! services that need it.

pub mod otp;
pub mod tokens;

pub use otp::{generate_otp, FixedOtpGenerator, OtpGenerator, SecureOtpGenerator};
pub use tokens::{TokenKind, TokenService};

use crate::clock::Clock;
use crate::config::Settings;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub struct SecurityContext {
    pub tokens: TokenService,
    pub otp: Arc<dyn OtpGenerator>,
    pub clock: Arc<dyn Clock>,
    pub otp_length: usize,
}

impl SecurityContext {
    pub fn new(settings: &Settings, otp: Arc<dyn OtpGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: TokenService::new(
                settings.jwt_secret.as_bytes(),
                settings.access_token_ttl_minutes,
                settings.refresh_token_ttl_minutes,
                clock.clone(),
            ),
            otp,
            clock,
            otp_length: settings.otp_length,
        }
    }

    pub fn new_otp(&self) -> String {
        self.otp.generate(self.otp_length)
    }
}

/// Digest stored in place of a password
pub fn hash_password(user_id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
