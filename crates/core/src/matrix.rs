use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::distance::DistanceEstimator;
use crate::error::{ClusterError, Result};
use crate::record::Record;
use crate::store::MatrixStore;

const PROGRESS_EVERY: usize = 500;

/// Square, symmetric, zero-diagonal matrix stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    /// Wraps raw row-major values. Symmetry is not checked; the length must
    /// be `size * size`.
    pub fn from_raw(size: usize, values: Vec<f64>) -> Option<Self> {
        (size.checked_mul(size) == Some(values.len())).then_some(Self { size, values })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let size = rows.len();
        if rows.iter().any(|row| row.len() != size) {
            return None;
        }
        Some(Self {
            size,
            values: rows.concat(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.size, self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.size + col]
    }

    /// Writes both `(row, col)` and `(col, row)`.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.size + col] = value;
        self.values[col * self.size + row] = value;
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| {
            self.get(i, i) == 0.0 && (i + 1..self.size).all(|j| self.get(i, j) == self.get(j, i))
        })
    }
}

/// Computes the matrix for `records` in their given order. Each unordered
/// pair is evaluated exactly once; rows are computed in parallel.
pub fn build_matrix(estimator: &DistanceEstimator, records: &[Record]) -> DistanceMatrix {
    let size = records.len();
    let upper: Vec<Vec<f64>> = (0..size)
        .into_par_iter()
        .map(|i| {
            let row = records[i + 1..]
                .iter()
                .map(|other| estimator.distance(&records[i], other))
                .collect();
            if (i + 1) % PROGRESS_EVERY == 0 {
                debug!(row = i + 1, total = size, "distance rows computed");
            }
            row
        })
        .collect();

    let mut matrix = DistanceMatrix::zeros(size);
    for (i, row) in upper.into_iter().enumerate() {
        for (offset, value) in row.into_iter().enumerate() {
            matrix.set(i, i + 1 + offset, value);
        }
    }
    matrix
}

/// Loads a matrix from the store when present, computing and persisting it
/// otherwise.
pub struct MatrixCache<'a> {
    estimator: &'a DistanceEstimator,
    store: &'a dyn MatrixStore,
}

impl<'a> MatrixCache<'a> {
    pub fn new(estimator: &'a DistanceEstimator, store: &'a dyn MatrixStore) -> Self {
        Self { estimator, store }
    }

    pub fn get_or_build(&self, records: &[Record], cache_key: &str) -> Result<DistanceMatrix> {
        let expected = records.len();
        if expected == 0 {
            return Ok(DistanceMatrix::zeros(0));
        }
        if self.store.exists(cache_key)? {
            info!(key = cache_key, "loading distance matrix");
            let matrix = self.store.load(cache_key)?;
            if matrix.size() != expected {
                return Err(ClusterError::ShapeMismatch {
                    key: cache_key.to_string(),
                    expected,
                    found: matrix.size(),
                });
            }
            return Ok(matrix);
        }
        info!(key = cache_key, records = expected, "calculating distance matrix");
        let matrix = build_matrix(self.estimator, records);
        self.store.save(cache_key, &matrix)?;
        info!(key = cache_key, "distance matrix saved");
        Ok(matrix)
    }
}
