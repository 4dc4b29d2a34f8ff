use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::affinity::AffinityPropagation;
use crate::distance::DistanceEstimator;
use crate::error::{ClusterError, Result};
use crate::matrix::MatrixCache;
use crate::record::{
    ensure_unique_ids, ClusterAssignment, ClusterLabel, Record, SubclusterAssignment,
};
use crate::store::{cluster_cache_key, MatrixStore};

#[derive(Debug, Default)]
pub struct SubclusterReport {
    pub assignment: SubclusterAssignment,
    /// Clusters whose subclustering failed; their siblings are unaffected.
    pub failures: Vec<(ClusterLabel, ClusterError)>,
}

impl SubclusterReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reruns matrix construction and clustering inside every top-level cluster.
pub struct Subclusterer<'a> {
    estimator: &'a DistanceEstimator,
    store: &'a dyn MatrixStore,
    clusterer: &'a AffinityPropagation,
}

impl<'a> Subclusterer<'a> {
    pub fn new(
        estimator: &'a DistanceEstimator,
        store: &'a dyn MatrixStore,
        clusterer: &'a AffinityPropagation,
    ) -> Self {
        Self {
            estimator,
            store,
            clusterer,
        }
    }

    pub fn subcluster(&self, grouped: &BTreeMap<ClusterLabel, Vec<Record>>) -> SubclusterReport {
        let mut report = SubclusterReport::default();
        for (&label, records) in grouped {
            match self.subcluster_one(label, records) {
                Ok(assignment) => {
                    info!(
                        cluster = label,
                        records = records.len(),
                        subclusters = assignment.cluster_count(),
                        "subclustered"
                    );
                    report.assignment.insert(label, assignment);
                }
                Err(err) => {
                    warn!(cluster = label, error = %err, "subclustering failed; skipping cluster");
                    report.failures.push((label, err));
                }
            }
        }
        report
    }

    pub fn subcluster_one(&self, label: ClusterLabel, records: &[Record]) -> Result<ClusterAssignment> {
        if records.len() <= 1 {
            return Ok(ClusterAssignment::from_labels(records, &[0]));
        }
        ensure_unique_ids(records)?;
        let matrix =
            MatrixCache::new(self.estimator, self.store).get_or_build(records, &cluster_cache_key(label))?;
        let clustering = self.clusterer.cluster(&matrix)?;
        Ok(ClusterAssignment::from_labels(records, &clustering.labels))
    }
}
