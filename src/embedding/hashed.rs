//! Feature-hashing embedder.
//!
//! Each lowercase word token and each character trigram of a word is hashed into one
//! of `dimensions` buckets with a sign bit, then the vector is L2-normalized. Texts
//! sharing vocabulary land close together, which is all incident lookup needs: the
//! indexed descriptions are built from a fixed template (component, metric bands).

use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::error::{Result, VigilError};

/// Weight of a whole-word feature relative to a trigram feature.
const WORD_WEIGHT: f32 = 2.0;

pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(VigilError::Internal("embedding dimension must be > 0".into()));
        }

        let mut v = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '.'))
            .filter(|w| !w.is_empty());

        for word in words {
            self.add_feature(&mut v, &format!("w:{word}"), WORD_WEIGHT);
            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.add_feature(&mut v, &format!("t:{trigram}"), 1.0);
                }
            }
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn produces_normalized_vectors_of_requested_size() {
        let embedder = HashedEmbedder::new(384);
        let v = embedder.embed("api latency 450ms error 0.120").unwrap();
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn is_deterministic() {
        let embedder = HashedEmbedder::new(64);
        assert_eq!(
            embedder.embed("checkout timeout").unwrap(),
            embedder.embed("checkout timeout").unwrap()
        );
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashedEmbedder::new(384);
        let base = embedder.embed("payments-api latency-critical errors-high").unwrap();
        let near = embedder.embed("payments-api latency-critical errors-low").unwrap();
        let far = embedder.embed("search-indexer latency-normal errors-none").unwrap();
        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashedEmbedder::new(16);
        let v = embedder.embed("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dimensions_is_an_error() {
        assert!(HashedEmbedder::new(0).embed("x").is_err());
    }
}
