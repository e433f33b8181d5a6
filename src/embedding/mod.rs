//! Text-to-vector embedding.
//!
//! Provides the [`EmbeddingProvider`] trait and a deterministic feature-hashing
//! implementation ([`hashed::HashedEmbedder`]) producing L2-normalized vectors of
//! [`EMBEDDING_DIM`] dimensions. The provider is created via [`create_provider`].

pub mod hashed;

use crate::error::Result;

/// Default number of dimensions in the embedding vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`EmbeddingProvider::dimensions`]
/// entries. All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;
}

/// Create the embedding provider for an index of the given dimensionality.
pub fn create_provider(dimensions: usize) -> Box<dyn EmbeddingProvider> {
    Box::new(hashed::HashedEmbedder::new(dimensions))
}
