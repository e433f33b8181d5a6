#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use vigil::config::{MemoryConfig, VigilConfig};
use vigil::embedding::{self, EmbeddingProvider};
use vigil::engine::ReliabilityEngine;
use vigil::event::{EventSeverity, ReliabilityEvent};
use vigil::index::{DurableVectorIndex, IndexOptions, IndexPaths};
use vigil::memory::IncidentGraphMemory;

/// Small dimension keeps the index files tiny; the hashed embedder works at any size.
pub const TEST_DIM: usize = 64;

/// Fixed reference time for deterministic IDs and cooldowns.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// An event observed `secs` seconds after [`t0`].
pub fn event_at(component: &str, latency_p99: f64, error_rate: f64, secs: i64) -> ReliabilityEvent {
    let mut event = ReliabilityEvent::new(component, latency_p99, error_rate);
    event.timestamp = t0() + chrono::Duration::seconds(secs);
    event.severity = EventSeverity::High;
    event
}

/// Writer options that never flush or save on their own within a test.
pub fn index_options(dimension: usize) -> IndexOptions {
    IndexOptions {
        dimension,
        batch_size: 1024,
        save_interval: Duration::from_secs(3600),
        queue_capacity: 256,
        force_save_timeout: Duration::from_secs(5),
    }
}

pub fn open_index(dir: &Path) -> Arc<DurableVectorIndex> {
    Arc::new(DurableVectorIndex::open(IndexPaths::in_dir(dir), index_options(TEST_DIM)).unwrap())
}

pub fn embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::from(embedding::create_provider(TEST_DIM))
}

/// Graph memory over a fresh index in `dir`.
pub fn test_memory(dir: &Path, config: &MemoryConfig) -> Arc<IncidentGraphMemory> {
    Arc::new(IncidentGraphMemory::new(open_index(dir), embedder(), config))
}

/// Config rooted at `dir` with a writer that only persists when asked.
pub fn test_config(dir: &Path) -> VigilConfig {
    let mut config = VigilConfig::default();
    config.storage.data_dir = dir.display().to_string();
    config.index.dimension = TEST_DIM;
    config.index.batch_size = 1024;
    config.index.save_interval_secs = 3600;
    config.index.force_save_timeout_secs = 5;
    config
}

pub fn test_engine(dir: &Path) -> ReliabilityEngine {
    ReliabilityEngine::open(&test_config(dir)).unwrap()
}
