//! Exact (brute-force) nearest-neighbor index under squared L2 distance.
//!
//! Vectors are stored row-major in one contiguous buffer. The index is
//! append-only: entry `i` keeps id `i` for the lifetime of the index.

use serde::{Deserialize, Serialize};

use investiq_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self { Self { dim, data: Vec::new() } }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { if self.dim == 0 { 0 } else { self.data.len() / self.dim } }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let start = id.checked_mul(self.dim)?;
        let end = start.checked_add(self.dim)?;
        self.data.get(start..end)
    }

    /// Reject the batch if any vector has the wrong width.
    pub fn check_dims(&self, vectors: &[Vec<f32>]) -> Result<()> {
        match vectors.iter().find(|v| v.len() != self.dim) {
            Some(bad) => Err(Error::DimensionMismatch { expected: self.dim, actual: bad.len() }),
            None => Ok(()),
        }
    }

    /// Append `vectors` in order. The whole batch is validated first, so a
    /// mismatch leaves the index untouched.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        self.check_dims(vectors)?;
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors { self.data.extend_from_slice(v); }
        Ok(())
    }

    /// Up to `k` nearest entries, closest first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 || self.is_empty() { return Ok(Vec::new()); }
        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(id, row)| Neighbor { id, distance: squared_l2(row, query) })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Reject a decoded index whose buffer is not a whole number of rows.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.dim > 0 && self.data.len() % self.dim == 0
    }
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| { let d = x - y; d * d }).sum()
}
