//! Synchronized owner of the ANN index and its parallel text list.
//!
//! One `RwLock` guards both so a search never observes a vector without its text (or
//! a half-applied batch). Writers queue on the write lock; readers run concurrently.

use parking_lot::RwLock;

use super::flat::FlatL2Index;
use super::persist;
use crate::error::{Result, VigilError};

/// Result of a k-NN query: parallel arrays, closest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub ids: Vec<u64>,
    /// Squared L2 distances.
    pub distances: Vec<f32>,
}

impl SearchHits {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, f32)> + '_ {
        self.ids.iter().copied().zip(self.distances.iter().copied())
    }
}

struct StoreState {
    index: FlatL2Index,
    texts: Vec<String>,
}

pub struct VectorStore {
    state: RwLock<StoreState>,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self::from_parts(FlatL2Index::new(dimension), Vec::new())
    }

    /// Wrap a loaded index. `texts` must hold one entry per vector.
    pub fn from_parts(index: FlatL2Index, texts: Vec<String>) -> Self {
        debug_assert_eq!(index.len(), texts.len());
        Self {
            state: RwLock::new(StoreState { index, texts }),
        }
    }

    pub fn dimension(&self) -> usize {
        self.state.read().index.dimension()
    }

    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one vector and its text, returning the assigned ID.
    pub fn add(&self, vector: &[f32], text: impl Into<String>) -> Result<u64> {
        let mut state = self.state.write();
        let id = state.index.add(vector)?;
        state.texts.push(text.into());
        Ok(id)
    }

    /// Append a batch under a single write lock. Either every item lands or none does.
    pub fn add_batch(&self, items: &[(Vec<f32>, String)]) -> Result<std::ops::Range<u64>> {
        let mut state = self.state.write();
        let range = state
            .index
            .add_batch(items.iter().map(|(v, _)| v.as_slice()))?;
        state.texts.extend(items.iter().map(|(_, t)| t.clone()));
        Ok(range)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<SearchHits> {
        let state = self.state.read();
        let scored = state.index.search(query, k)?;
        let (ids, distances) = scored.into_iter().unzip();
        Ok(SearchHits { ids, distances })
    }

    pub fn text(&self, id: u64) -> Option<String> {
        self.state.read().texts.get(id as usize).cloned()
    }

    /// Search and resolve texts under one read lock.
    pub fn search_with_texts(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32, String)>> {
        let state = self.state.read();
        let scored = state.index.search(query, k)?;
        scored
            .into_iter()
            .map(|(id, distance)| {
                let text = state.texts.get(id as usize).cloned().ok_or_else(|| {
                    VigilError::Internal(format!("vector {id} has no sidecar text"))
                })?;
                Ok((id, distance, text))
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.state.read().texts.clone()
    }

    /// Encode a consistent `(index bytes, sidecar bytes)` pair for persistence.
    pub fn encode_snapshot(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let state = self.state.read();
        let index_bytes = persist::encode_index(&state.index)?;
        let texts_bytes = serde_json::to_vec(&state.texts)?;
        Ok((index_bytes, texts_bytes))
    }
}
