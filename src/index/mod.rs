//! Vector storage for incident embeddings.
//!
//! - [`flat`]: the exact squared-L2 nearest-neighbor structure
//! - [`store`]: [`VectorStore`], the lock-guarded index plus text sidecar
//! - [`durable`]: [`DurableVectorIndex`], queued ingestion, batching, and persistence
//! - [`persist`]: on-disk format and the atomic write protocol

pub mod durable;
pub mod flat;
pub mod persist;
pub mod store;

pub use durable::{DurableVectorIndex, IndexOptions};
pub use flat::{distance_to_similarity, FlatL2Index};
pub use persist::{IndexPaths, SnapshotInfo};
pub use store::{SearchHits, VectorStore};
