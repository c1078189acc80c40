//! Voice verification engine
//!
//! Compares a fresh sample against the enrolled reference and decides
//! whether the OTP fallback is needed. Storage lookups live in the auth
//! service; everything here is synchronous and side-effect free.

pub mod embedding;

pub use embedding::{DigestEmbedder, EmbeddingExtractor, EMBEDDING_DIM};

use crate::models::VoiceCheck;
use crate::security::constant_time_eq;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::debug;

/// Decode a base64 audio payload as sent by clients.
pub fn decode_audio(audio_base64: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(audio_base64.trim())?)
}

/// Cosine similarity clamped to `[0, 1]`.
/// Empty, zero-norm or length-mismatched vectors give 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

pub struct VoiceVerifier {
    extractor: Arc<dyn EmbeddingExtractor>,
    threshold: f64,
}

impl VoiceVerifier {
    pub fn new(extractor: Arc<dyn EmbeddingExtractor>, threshold: f64) -> Self {
        Self {
            extractor,
            threshold,
        }
    }

    pub fn embed(&self, sample: &[u8]) -> Vec<f64> {
        self.extractor.extract(sample)
    }

    pub fn verify(&self, enrolled: &[f64], candidate: &[f64]) -> f64 {
        cosine_similarity(enrolled, candidate)
    }

    /// Login decision for one sample.
    ///
    /// The fallback is required when the similarity is under the threshold or
    /// no OTP was supplied. When it is required, success depends on the
    /// supplied OTP matching the live session OTP.
    pub fn check(
        &self,
        enrolled: &[f64],
        sample: &[u8],
        supplied_otp: Option<&str>,
        session_otp: Option<&str>,
    ) -> VoiceCheck {
        let similarity = self.verify(enrolled, &self.embed(sample));
        let supplied_otp = supplied_otp.filter(|otp| !otp.is_empty());
        let fallback_required = similarity < self.threshold || supplied_otp.is_none();

        let otp_matches = match (supplied_otp, session_otp) {
            (Some(given), Some(stored)) => constant_time_eq(given, stored),
            _ => false,
        };

        debug!(similarity, fallback_required, "Voice check evaluated");

        if fallback_required && !otp_matches {
            return VoiceCheck {
                success: false,
                similarity,
                fallback_required: true,
            };
        }

        VoiceCheck {
            success: true,
            similarity,
            fallback_required,
        }
    }
}

impl Default for VoiceVerifier {
    fn default() -> Self {
        Self::new(Arc::new(DigestEmbedder), 0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_decode_audio() {
        assert_eq!(decode_audio("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_audio("not base64!").is_err());
    }

    #[test]
    fn test_identical_vectors() {
        let v = DigestEmbedder.extract(b"voice");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let a = DigestEmbedder.extract(b"alpha");
        let b = DigestEmbedder.extract(b"beta");
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < EPS);
    }

    #[test]
    fn test_matching_voice_with_otp_succeeds_without_fallback() {
        let verifier = VoiceVerifier::default();
        let enrolled = verifier.embed(b"enrolled");
        let result = verifier.check(&enrolled, b"enrolled", Some("123456"), Some("123456"));
        assert!(result.success);
        assert!(!result.fallback_required);
    }

    #[test]
    fn test_matching_voice_without_otp_fails() {
        let verifier = VoiceVerifier::default();
        let enrolled = verifier.embed(b"enrolled");
        let result = verifier.check(&enrolled, b"enrolled", None, Some("123456"));
        assert!(!result.success);
        assert!(result.fallback_required);
    }

    #[test]
    fn test_weak_voice_rescued_by_otp() {
        // Threshold above 1.0 means no sample can pass on voice alone.
        let verifier = VoiceVerifier::new(Arc::new(DigestEmbedder), 1.1);
        let enrolled = verifier.embed(b"enrolled");

        let rescued = verifier.check(&enrolled, b"other", Some("123456"), Some("123456"));
        assert!(rescued.success);
        assert!(rescued.fallback_required);

        let wrong = verifier.check(&enrolled, b"other", Some("000000"), Some("123456"));
        assert!(!wrong.success);
        assert!(wrong.fallback_required);

        let no_session = verifier.check(&enrolled, b"other", Some("123456"), None);
        assert!(!no_session.success);
    }
}
