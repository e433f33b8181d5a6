//! Exact nearest-neighbor index over squared L2 distance.
//!
//! Vectors are stored back to back in one `Vec<f32>`; the ordinal of a vector is its
//! ID. This structure is not synchronized: [`super::store::VectorStore`] owns it
//! behind a lock and funnels all mutation through one writer.

use crate::error::{Result, VigilError};

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Rebuild from a flat buffer. The buffer length must be a multiple of `dimension`.
    pub fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(VigilError::Codec(format!(
                "buffer of {} floats does not hold whole vectors of dimension {dimension}",
                data.len()
            )));
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn raw(&self) -> &[f32] {
        &self.data
    }

    pub fn vector(&self, id: u64) -> Option<&[f32]> {
        let start = (id as usize).checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VigilError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Append one vector, returning its ordinal ID.
    pub fn add(&mut self, vector: &[f32]) -> Result<u64> {
        self.check_dimension(vector)?;
        let id = self.len() as u64;
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    /// Append many vectors. Either all are added or none are.
    pub fn add_batch<'a, I>(&mut self, vectors: I) -> Result<std::ops::Range<u64>>
    where
        I: IntoIterator<Item = &'a [f32]> + Clone,
    {
        for v in vectors.clone() {
            self.check_dimension(v)?;
        }
        let first = self.len() as u64;
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(first..self.len() as u64)
    }

    /// Drop every vector at or after ordinal `len`.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// The `k` nearest vectors to `query`, closest first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        self.check_dimension(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u64, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, v)| (id as u64, squared_l2(query, v)))
            .collect();

        let by_distance = |a: &(u64, f32), b: &(u64, f32)| {
            a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
        };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_by(by_distance);
        Ok(scored)
    }
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Convert a squared L2 distance between unit vectors into a cosine similarity in `[0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f64 {
    (1.0 - f64::from(distance) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn add_assigns_sequential_ids() {
        let mut index = FlatL2Index::new(4);
        assert_eq!(index.add(&unit(4, 0)).unwrap(), 0);
        assert_eq!(index.add(&unit(4, 1)).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(unit(4, 1).as_slice()));
        assert_eq!(index.vector(2), None);
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut index = FlatL2Index::new(4);
        let err = index.add(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            VigilError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn add_batch_is_all_or_nothing() {
        let mut index = FlatL2Index::new(3);
        let good = unit(3, 0);
        let bad = vec![1.0, 2.0];
        assert!(index
            .add_batch([good.as_slice(), bad.as_slice()])
            .is_err());
        assert!(index.is_empty());

        let range = index
            .add_batch([good.as_slice(), unit(3, 2).as_slice()])
            .unwrap();
        assert_eq!(range, 0..2);
    }

    #[test]
    fn search_returns_nearest_first() {
        let mut index = FlatL2Index::new(3);
        index.add(&unit(3, 0)).unwrap();
        index.add(&unit(3, 1)).unwrap();
        index.add(&[0.9, 0.1, 0.0]).unwrap();

        let hits = index.search(&unit(3, 0), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[0].1, 0.0);
        assert_eq!(hits[1].0, 2);
    }

    #[test]
    fn search_with_k_larger_than_index() {
        let mut index = FlatL2Index::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        let hits = index.search(&[0.0, 1.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn search_empty_index() {
        let index = FlatL2Index::new(2);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn from_raw_rejects_partial_vectors() {
        assert!(FlatL2Index::from_raw(3, vec![0.0; 7]).is_err());
        assert_eq!(FlatL2Index::from_raw(3, vec![0.0; 6]).unwrap().len(), 2);
    }

    #[test]
    fn similarity_conversion() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(2.0), 0.0);
        assert_eq!(distance_to_similarity(4.0), 0.0);
        assert!((distance_to_similarity(0.5) - 0.75).abs() < 1e-9);
    }
}
