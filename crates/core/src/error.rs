use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("matrix encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("cached matrix {key:?} has shape ({found}, {found}), expected ({expected}, {expected})")]
    ShapeMismatch {
        key: String,
        expected: usize,
        found: usize,
    },
    #[error("similarity matrix holds a non-finite entry at ({row}, {col})")]
    InvalidMatrix { row: usize, col: usize },
    #[error("corrupt matrix cache {key:?}: {reason}")]
    CorruptMatrix { key: String, reason: String },
    #[error("invalid cache key: {0:?}")]
    InvalidCacheKey(String),
    #[error("duplicate record id: {0}")]
    DuplicateRecordId(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
