use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::affinity::{AffinityParams, AffinityPropagation};
use crate::distance::{DistanceConfig, DistanceEstimator};
use crate::error::Result;
use crate::matrix::{DistanceMatrix, MatrixCache};
use crate::record::{ensure_unique_ids, ClusterAssignment, ClusterLabel, Record};
use crate::store::MatrixStore;
use crate::subcluster::{SubclusterReport, Subclusterer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub distance: DistanceConfig,
    pub affinity: AffinityParams,
}

/// Owns everything one clustering run needs: the memoizing estimator, the
/// matrix store and the clustering parameters.
pub struct Engine<S: MatrixStore> {
    estimator: DistanceEstimator,
    clusterer: AffinityPropagation,
    store: S,
}

impl<S: MatrixStore> Engine<S> {
    pub fn new(config: EngineConfig, store: S) -> Result<Self> {
        Ok(Self {
            estimator: DistanceEstimator::new(config.distance),
            clusterer: AffinityPropagation::new(config.affinity)?,
            store,
        })
    }

    pub fn estimator(&self) -> &DistanceEstimator {
        &self.estimator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn matrix(&self, records: &[Record], cache_key: &str) -> Result<DistanceMatrix> {
        MatrixCache::new(&self.estimator, &self.store).get_or_build(records, cache_key)
    }

    pub fn cluster_records(&self, records: &[Record], cache_key: &str) -> Result<ClusterAssignment> {
        ensure_unique_ids(records)?;
        let matrix = self.matrix(records, cache_key)?;
        info!(records = records.len(), "clustering first lines");
        let clustering = self.clusterer.cluster(&matrix)?;
        info!(
            clusters = clustering.cluster_count(),
            iterations = clustering.iterations,
            converged = clustering.converged,
            "clustering complete"
        );
        Ok(ClusterAssignment::from_labels(records, &clustering.labels))
    }

    pub fn subcluster(&self, grouped: &BTreeMap<ClusterLabel, Vec<Record>>) -> SubclusterReport {
        info!(clusters = grouped.len(), "subclustering");
        Subclusterer::new(&self.estimator, &self.store, &self.clusterer).subcluster(grouped)
    }
}
