//! Text-to-speech
//!
//! ElevenLabs-compatible synthesis. Without a key the reply text itself is
//! packed as the audio payload so clients still get a well-formed response.

use super::{bounded, Capability, DegradedReason, Speech, TextToSpeech};
use crate::config::Settings;
use crate::error::BankingError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const SYNTHESIS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const MODEL_ID: &str = "eleven_multilingual_v2";

pub fn fallback_speech(text: &str, language: &str) -> Speech {
    Speech {
        audio_base64: STANDARD.encode(format!("{}:{}", language, text)),
        duration_seconds: (text.chars().count() as f64 / 10.0).max(1.0),
    }
}

pub struct ElevenLabsSynthesizer {
    client: Client,
    api_key: Option<String>,
    voice_id: String,
    base_url: String,
    timeout: Duration,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: Option<String>, voice_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            voice_id: voice_id.into(),
            base_url: SYNTHESIS_URL.to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.elevenlabs_api_key.clone(),
            settings.elevenlabs_voice_id.clone(),
            Duration::from_secs(settings.external_timeout_secs),
        )
    }

    async fn request(&self, api_key: &str, text: &str) -> Result<Speech> {
        let url = format!("{}/{}", self.base_url, self.voice_id);
        let payload = json!({
            "text": text,
            "model_id": MODEL_ID,
            "voice_settings": { "stability": 0.4, "similarity_boost": 0.85 },
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BankingError::ExternalServiceDegraded(format!(
                "synthesis returned {}",
                response.status()
            )));
        }

        let audio = response.bytes().await?;
        debug!(bytes = audio.len(), "Synthesis received");

        Ok(Speech {
            audio_base64: STANDARD.encode(&audio),
            duration_seconds: (text.chars().count() as f64 / 12.0).max(1.0),
        })
    }
}

#[async_trait::async_trait]
impl TextToSpeech for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Capability<Speech> {
        let outcome = match self.api_key.as_deref() {
            None => Err(DegradedReason::NotConfigured),
            Some(key) => bounded(self.timeout, self.request(key, text)).await,
        };
        Capability::from_outcome(outcome, || fallback_speech(text, language))
    }
}
