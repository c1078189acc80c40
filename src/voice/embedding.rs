//! Voice feature extraction
//!
//! The extractor is a swappable capability. The engine relies only on the
//! contract: deterministic, fixed length, components in `[0, 1]`.

use sha2::{Digest, Sha256};

pub const EMBEDDING_DIM: usize = 16;

pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, sample: &[u8]) -> Vec<f64>;
}

/// Placeholder extractor: the first bytes of the sample's SHA-256 digest,
/// scaled to `[0, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestEmbedder;

impl EmbeddingExtractor for DigestEmbedder {
    fn extract(&self, sample: &[u8]) -> Vec<f64> {
        Sha256::digest(sample)
            .iter()
            .take(EMBEDDING_DIM)
            .map(|&b| f64::from(b) / 255.0)
            .collect()
    }
}
