//! Affinity propagation over a precomputed distance matrix.
//!
//! Similarities are the negated distances. Every point starts as a
//! potential exemplar with self-similarity `preference` (the median
//! similarity unless configured); responsibility and availability messages
//! are exchanged until the set of exemplars stops changing.
//!
//! Exact ties between candidate exemplars are broken towards the lower
//! index: before message passing, similarity to candidate `k` is lowered by
//! `k` units of a bias scaled to the matrix magnitude and far below any gap
//! between distinct distances. The final assignment uses the unbiased
//! similarities with an explicit lowest-index rule.
//!
//! A run that reaches `max_iterations` keeps the exemplar set with the
//! highest net similarity seen along the way. Exemplars at distance zero
//! from a lower-index exemplar are dropped, so copies of one line always
//! share a cluster.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};
use crate::matrix::DistanceMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityParams {
    pub damping: f64,
    pub max_iterations: usize,
    /// Iterations the exemplar set must stay unchanged to count as converged.
    pub convergence_window: usize,
    /// Self-similarity of every point. `None` uses the median similarity.
    pub preference: Option<f64>,
}

impl Default for AffinityParams {
    fn default() -> Self {
        Self {
            damping: 0.5,
            max_iterations: 1000,
            convergence_window: 15,
            preference: None,
        }
    }
}

impl AffinityParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(ClusterError::InvalidParameter(format!(
                "damping must lie in (0, 1), got {}",
                self.damping
            )));
        }
        if self.max_iterations == 0 {
            return Err(ClusterError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.convergence_window == 0 {
            return Err(ClusterError::InvalidParameter(
                "convergence_window must be at least 1".to_string(),
            ));
        }
        if let Some(preference) = self.preference {
            if !preference.is_finite() {
                return Err(ClusterError::InvalidParameter(format!(
                    "preference must be finite, got {preference}"
                )));
            }
        }
        Ok(())
    }
}

/// Result of one clustering run. `labels[i]` is the index of the exemplar
/// representing point `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub exemplars: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

impl Clustering {
    fn trivial(labels: Vec<usize>, exemplars: Vec<usize>) -> Self {
        Self {
            labels,
            exemplars,
            iterations: 0,
            converged: true,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.exemplars.len()
    }

    pub fn members(&self, exemplar: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == exemplar)
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AffinityPropagation {
    params: AffinityParams,
}

impl AffinityPropagation {
    pub fn new(params: AffinityParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn cluster(&self, matrix: &DistanceMatrix) -> Result<Clustering> {
        let n = matrix.size();
        if let Some(idx) = matrix.values().iter().position(|v| !v.is_finite()) {
            return Err(ClusterError::InvalidMatrix {
                row: idx / n,
                col: idx % n,
            });
        }
        match n {
            0 => return Ok(Clustering::trivial(Vec::new(), Vec::new())),
            1 => return Ok(Clustering::trivial(vec![0], vec![0])),
            _ => {}
        }

        let mut similarity: Vec<f64> = matrix.values().iter().map(|d| -d).collect();
        let preference = self
            .params
            .preference
            .unwrap_or_else(|| median(&similarity));
        for i in 0..n {
            similarity[i * n + i] = preference;
        }

        if let Some(shared) = shared_similarity(&similarity, n) {
            debug!(n, "all similarities equal; skipping message passing");
            return Ok(if preference > shared {
                Clustering::trivial((0..n).collect(), (0..n).collect())
            } else {
                Clustering::trivial(vec![0; n], vec![0])
            });
        }

        let (exemplars, iterations, converged) = self.propagate(&similarity, n);
        if !converged {
            warn!(
                iterations,
                "affinity propagation did not converge; using the best exemplar set seen"
            );
        }
        let exemplars = merge_identical(matrix, &exemplars);
        let labels = assign(&similarity, n, &exemplars);
        let exemplars = merge_identical(matrix, &refine(&similarity, n, &labels, &exemplars));
        let labels = assign(&similarity, n, &exemplars);
        debug!(clusters = exemplars.len(), iterations, "clustering finished");
        Ok(Clustering {
            labels,
            exemplars,
            iterations,
            converged,
        })
    }

    /// Runs message passing and returns the exemplar indices (ascending),
    /// the iteration count and whether the run converged. Without
    /// convergence the returned set is the best-scoring one observed.
    fn propagate(&self, similarity: &[f64], n: usize) -> (Vec<usize>, usize, bool) {
        let damping = self.params.damping;
        let window = self.params.convergence_window;
        let s = tie_broken(similarity, n);
        let mut r = vec![0.0; n * n];
        let mut a = vec![0.0; n * n];
        let mut colsum = vec![0.0; n];
        let mut history = vec![vec![false; n]; window];
        let mut evidence = vec![0.0; n];
        let mut current: Vec<usize> = Vec::new();
        let mut best_set: Option<(f64, Vec<usize>)> = None;
        let mut iterations = 0;
        let mut converged = false;

        for it in 0..self.params.max_iterations {
            iterations = it + 1;

            r.par_chunks_mut(n)
                .zip(a.par_chunks(n))
                .zip(s.par_chunks(n))
                .for_each(|((r_row, a_row), s_row)| {
                    let mut best = f64::NEG_INFINITY;
                    let mut second = f64::NEG_INFINITY;
                    let mut best_idx = 0;
                    for k in 0..n {
                        let value = a_row[k] + s_row[k];
                        if value > best {
                            second = best;
                            best = value;
                            best_idx = k;
                        } else if value > second {
                            second = value;
                        }
                    }
                    for k in 0..n {
                        let competitor = if k == best_idx { second } else { best };
                        let update = s_row[k] - competitor;
                        r_row[k] = damping * r_row[k] + (1.0 - damping) * update;
                    }
                });

            colsum.iter_mut().for_each(|v| *v = 0.0);
            for (i, r_row) in r.chunks(n).enumerate() {
                for (k, value) in r_row.iter().enumerate() {
                    colsum[k] += if i == k { *value } else { value.max(0.0) };
                }
            }
            a.par_chunks_mut(n)
                .zip(r.par_chunks(n))
                .enumerate()
                .for_each(|(i, (a_row, r_row))| {
                    for k in 0..n {
                        let update = if i == k {
                            colsum[k] - r_row[k]
                        } else {
                            (colsum[k] - r_row[k].max(0.0)).min(0.0)
                        };
                        a_row[k] = damping * a_row[k] + (1.0 - damping) * update;
                    }
                });

            let slot = &mut history[it % window];
            let mut count = 0;
            for i in 0..n {
                evidence[i] = r[i * n + i] + a[i * n + i];
                slot[i] = evidence[i] > 0.0;
                count += usize::from(slot[i]);
            }

            let exemplars: Vec<usize> = (0..n).filter(|&i| evidence[i] > 0.0).collect();
            if !exemplars.is_empty() && exemplars != current {
                let score = net_similarity(similarity, n, &exemplars);
                if best_set.as_ref().map_or(true, |(top, _)| score > *top) {
                    best_set = Some((score, exemplars.clone()));
                }
            }
            current = exemplars;

            if iterations >= window && count > 0 && is_stable(&history, n) {
                converged = true;
                break;
            }
            if iterations % 100 == 0 {
                debug!(iterations, exemplars = count, "message passing");
            }
        }

        let exemplars = if converged {
            current
        } else if let Some((_, set)) = best_set {
            set
        } else {
            let mut strongest = 0;
            for i in 1..n {
                if evidence[i] > evidence[strongest] {
                    strongest = i;
                }
            }
            vec![strongest]
        };
        (exemplars, iterations, converged)
    }
}

impl Default for AffinityPropagation {
    fn default() -> Self {
        Self {
            params: AffinityParams::default(),
        }
    }
}

/// Median of all values; the mean of the two middle values for even counts.
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    let mid = sorted.len() / 2;
    let (lower, upper, _) = sorted.select_nth_unstable_by(mid, |x, y| x.total_cmp(y));
    let upper = *upper;
    if values.len() % 2 == 1 {
        return upper;
    }
    let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (below + upper) / 2.0
}

/// The common off-diagonal similarity, if every pair shares it.
fn shared_similarity(similarity: &[f64], n: usize) -> Option<f64> {
    let shared = similarity[1];
    let all_equal = (0..n).all(|i| (0..n).all(|k| i == k || similarity[i * n + k] == shared));
    all_equal.then_some(shared)
}

fn tie_broken(similarity: &[f64], n: usize) -> Vec<f64> {
    let scale = similarity
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let bias = scale * f64::EPSILON;
    similarity
        .iter()
        .enumerate()
        .map(|(idx, value)| value - bias * (idx % n) as f64)
        .collect()
}

/// Summed similarity of every point to the exemplar `assign` gives it.
fn net_similarity(similarity: &[f64], n: usize, exemplars: &[usize]) -> f64 {
    assign(similarity, n, exemplars)
        .iter()
        .enumerate()
        .map(|(j, &e)| similarity[j * n + e])
        .sum()
}

/// Keeps the exemplars (ascending) that have no lower-index exemplar at
/// distance zero.
fn merge_identical(matrix: &DistanceMatrix, exemplars: &[usize]) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(exemplars.len());
    for &e in exemplars {
        if !kept.iter().any(|&k| matrix.get(k, e) == 0.0) {
            kept.push(e);
        }
    }
    kept
}

fn is_stable(history: &[Vec<bool>], n: usize) -> bool {
    (0..n).all(|i| {
        let first = history[0][i];
        history.iter().all(|slot| slot[i] == first)
    })
}

/// Maps every point to its most similar exemplar; exemplars map to
/// themselves and ties go to the lower exemplar index.
fn assign(similarity: &[f64], n: usize, exemplars: &[usize]) -> Vec<usize> {
    (0..n)
        .map(|j| {
            if exemplars.binary_search(&j).is_ok() {
                return j;
            }
            let row = &similarity[j * n..(j + 1) * n];
            let mut best = exemplars[0];
            for &e in &exemplars[1..] {
                if row[e] > row[best] {
                    best = e;
                }
            }
            best
        })
        .collect()
}

/// Re-elects each cluster's exemplar as the member with the largest summed
/// similarity from the other members.
fn refine(similarity: &[f64], n: usize, labels: &[usize], exemplars: &[usize]) -> Vec<usize> {
    let mut refined: Vec<usize> = exemplars
        .iter()
        .map(|&exemplar| {
            let members: Vec<usize> = (0..n).filter(|&j| labels[j] == exemplar).collect();
            let mut best = exemplar;
            let mut best_score = f64::NEG_INFINITY;
            for &candidate in &members {
                let score: f64 = members
                    .iter()
                    .map(|&other| similarity[other * n + candidate])
                    .sum();
                if score > best_score {
                    best = candidate;
                    best_score = score;
                }
            }
            best
        })
        .collect();
    refined.sort_unstable();
    refined
}
