mod affinity;
mod distance;
mod engine;
mod error;
mod matrix;
mod normalization;
mod record;
mod store;
mod subcluster;

pub use affinity::{AffinityParams, AffinityPropagation, Clustering};
pub use distance::{DistanceConfig, DistanceEstimator};
pub use engine::{Engine, EngineConfig};
pub use error::{ClusterError, Result};
pub use matrix::{build_matrix, DistanceMatrix, MatrixCache};
pub use normalization::{normalize, LineNormalizer, NormalizedLine};
pub use record::{ensure_unique_ids, ClusterAssignment, ClusterLabel, Record, SubclusterAssignment};
pub use store::{
    cluster_cache_key, validate_cache_key, FileMatrixStore, MatrixStore, MemoryMatrixStore,
    GLOBAL_CACHE_KEY,
};
pub use subcluster::{SubclusterReport, Subclusterer};
