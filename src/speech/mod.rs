//! Speech and intent capabilities
//!
//! Transcription, synthesis and intent classification sit behind async
//! traits. Each call returns a [`Capability`]: the live backend result, or a
//! local deterministic substitute tagged with why the backend was skipped.
//! Backend failures never reach the caller as errors.

pub mod nlu;
pub mod stt;
pub mod tts;

pub use nlu::{extract_slots, KeywordIntentClassifier, RemoteIntentClassifier};
pub use stt::{fallback_transcript, WhisperTranscriber};
pub use tts::{fallback_speech, ElevenLabsSynthesizer};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// No credentials or endpoint configured
    NotConfigured,
    Timeout,
    Backend(String),
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::NotConfigured => write!(f, "not configured"),
            DegradedReason::Timeout => write!(f, "timed out"),
            DegradedReason::Backend(message) => write!(f, "backend error: {}", message),
        }
    }
}

/// Result of an external capability call
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Live(T),
    Degraded { value: T, reason: DegradedReason },
}

impl<T> Capability<T> {
    pub fn is_live(&self) -> bool {
        matches!(self, Capability::Live(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Capability::Live(value) | Capability::Degraded { value, .. } => value,
        }
    }

    pub fn reason(&self) -> Option<&DegradedReason> {
        match self {
            Capability::Live(_) => None,
            Capability::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Capability::Live(value) | Capability::Degraded { value, .. } => value,
        }
    }

    /// Unwrap the value, logging a degraded outcome under `service`.
    pub fn settle(self, service: &str) -> T {
        if let Capability::Degraded { reason, .. } = &self {
            if *reason != DegradedReason::NotConfigured {
                warn!(service, reason = %reason, "Using local fallback");
            }
        }
        self.into_value()
    }

    /// Live result from `outcome`, or `fallback` tagged with the failure.
    pub fn from_outcome(
        outcome: std::result::Result<T, DegradedReason>,
        fallback: impl FnOnce() -> T,
    ) -> Self {
        match outcome {
            Ok(value) => Capability::Live(value),
            Err(reason) => Capability::Degraded {
                value: fallback(),
                reason,
            },
        }
    }
}

/// Run a backend call under `limit`, classifying timeout and error apart.
pub async fn bounded<T, F>(limit: Duration, call: F) -> std::result::Result<T, DegradedReason>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DegradedReason::Backend(e.to_string())),
        Err(_) => Err(DegradedReason::Timeout),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: f64,
}

/// Synthesized reply audio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Speech {
    pub audio_base64: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Slots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
}

impl Slots {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.counterparty.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent: String,
    pub slots: Slots,
    pub confidence: f64,
}

#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Capability<Transcript>;
}

#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Capability<Speech>;
}

#[async_trait::async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, transcript: &str) -> Capability<IntentResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BankingError;

    #[tokio::test]
    async fn test_bounded_classifies_outcomes() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, BankingError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let failed = bounded(Duration::from_secs(1), async {
            Err::<u8, _>(BankingError::ExternalServiceDegraded("503".into()))
        })
        .await;
        assert!(matches!(failed, Err(DegradedReason::Backend(_))));

        let slow = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BankingError>(())
        })
        .await;
        assert_eq!(slow, Err(DegradedReason::Timeout));
    }

    #[test]
    fn test_capability_accessors() {
        let live = Capability::from_outcome(Ok(1), || 0);
        assert!(live.is_live());
        assert_eq!(live.reason(), None);

        let degraded = Capability::from_outcome(Err(DegradedReason::Timeout), || 0);
        assert!(!degraded.is_live());
        assert_eq!(degraded.value(), &0);
        assert_eq!(degraded.reason(), Some(&DegradedReason::Timeout));
        assert_eq!(degraded.settle("test"), 0);
    }
}
