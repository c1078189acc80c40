//! Speech-to-text
//!
//! Whisper-compatible multipart transcription, with a deterministic phrase
//! bank standing in when no key is configured or the call fails.

use super::{bounded, Capability, DegradedReason, SpeechToText, Transcript};
use crate::config::Settings;
use crate::error::BankingError;
use crate::Result;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Short clips: usually an amount
const AMOUNT_PHRASES: &[&str] = &[
    "five thousand rupees",
    "ten thousand",
    "two thousand five hundred",
    "fifteen thousand rupees",
    "one thousand",
    "five hundred rupees",
    "twenty thousand",
    "three thousand",
];

/// Medium clips: usually a recipient
const RECIPIENT_PHRASES: &[&str] = &[
    "send to John",
    "transfer to Alice",
    "pay Bob",
    "send money to Sarah",
    "transfer to Rajesh",
    "pay Priya",
];

/// Long clips: a full command
const COMMAND_PHRASES: &[&str] = &[
    "transfer five thousand rupees to Rajesh",
    "send ten thousand to Alice",
    "I want to transfer fifteen thousand to John",
    "please send two thousand five hundred rupees to Bob",
    "transfer one thousand rupees to Priya",
    "send money to Sarah amount is five thousand",
];

/// Pick a phrase by clip length and content digest. Same audio, same text.
pub fn fallback_transcript(audio: &[u8]) -> Transcript {
    let len = audio.len();
    let bank = if len < 5_000 {
        AMOUNT_PHRASES
    } else if len < 15_000 {
        RECIPIENT_PHRASES
    } else {
        COMMAND_PHRASES
    };

    let digest = Sha256::digest(audio);
    let index = usize::from(digest[0]) % bank.len();

    Transcript {
        text: bank[index].to_string(),
        confidence: (0.5 + len as f64 / 10_000.0).min(0.95),
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Whisper-compatible transcription client
pub struct WhisperTranscriber {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl WhisperTranscriber {
    pub fn new(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            endpoint: TRANSCRIPTION_URL.to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.openai_api_key.clone(),
            settings.whisper_model.clone(),
            Duration::from_secs(settings.external_timeout_secs),
        )
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn request(&self, api_key: &str, audio: &[u8], language: &str) -> Result<Transcript> {
        let file = Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .part("file", file);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BankingError::ExternalServiceDegraded(format!(
                "transcription returned {}",
                response.status()
            )));
        }

        let body: TranscriptionResponse = response.json().await?;
        let text = body.text.trim();
        if text.is_empty() {
            return Err(BankingError::ExternalServiceDegraded(
                "empty transcript".into(),
            ));
        }

        debug!(chars = text.len(), "Transcription received");
        Ok(Transcript {
            text: text.to_string(),
            confidence: body.confidence.unwrap_or(0.9),
        })
    }
}

#[async_trait::async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Capability<Transcript> {
        let outcome = match self.api_key.as_deref() {
            None => Err(DegradedReason::NotConfigured),
            Some(key) => bounded(self.timeout, self.request(key, audio, language)).await,
        };
        Capability::from_outcome(outcome, || fallback_transcript(audio))
    }
}
