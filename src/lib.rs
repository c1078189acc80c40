//! Voice Banking Assistant
//!
//! Backend for a voice-driven banking assistant:
//! - password + OTP + voice biometric login issuing access/refresh tokens
//! - two-phase transfers gated by an amount-keyed MFA policy
//! - per-user session state tying dialogue turns to banking actions
//! - speech, synthesis and intent backends with deterministic local fallbacks
//!
//! FLOW:
//! LOGIN → OTP → VOICE CHECK → TOKENS → INIT TRANSFER → MFA GATE → CONFIRM

pub mod api;
pub mod assistant;
pub mod auth;
pub mod banking;
pub mod clock;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod models;
pub mod security;
pub mod session;
pub mod speech;
pub mod store;
pub mod voice;

pub use error::Result;

pub use assistant::{Assistant, SpeechBackends};
pub use config::Settings;
pub use models::*;
