use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::matrix::DistanceMatrix;
use crate::record::ClusterLabel;

pub const GLOBAL_CACHE_KEY: &str = "global";
const MATRIX_FORMAT_VERSION: u32 = 1;
const MATRIX_EXTENSION: &str = "matrix";

pub fn cluster_cache_key(label: ClusterLabel) -> String {
    format!("cluster_{label}")
}

pub fn validate_cache_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ClusterError::InvalidCacheKey(key.to_string()))
    }
}

/// Durable store holding one distance matrix per cache key.
pub trait MatrixStore {
    fn exists(&self, key: &str) -> Result<bool>;
    fn load(&self, key: &str) -> Result<DistanceMatrix>;
    fn save(&self, key: &str, matrix: &DistanceMatrix) -> Result<()>;
}

#[derive(Serialize)]
struct StoredMatrixRef<'a> {
    version: u32,
    size: u64,
    values: &'a [f64],
}

#[derive(Deserialize)]
struct StoredMatrix {
    version: u32,
    size: u64,
    values: Vec<f64>,
}

/// Matrices as zstd-compressed bincode files, one `<key>.matrix` per key.
#[derive(Debug, Clone)]
pub struct FileMatrixStore {
    dir: PathBuf,
}

impl FileMatrixStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_cache_key(key)?;
        Ok(self.dir.join(format!("{key}.{MATRIX_EXTENSION}")))
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

impl MatrixStore for FileMatrixStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn load(&self, key: &str) -> Result<DistanceMatrix> {
        let path = self.path_for(key)?;
        let file = File::open(&path)?;
        let decoder = zstd::stream::Decoder::new(file)?;
        let stored: StoredMatrix =
            bincode::deserialize_from(decoder).map_err(|e| ClusterError::CorruptMatrix {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if stored.version != MATRIX_FORMAT_VERSION {
            return Err(ClusterError::CorruptMatrix {
                key: key.to_string(),
                reason: format!("unsupported format version {}", stored.version),
            });
        }
        let size = usize::try_from(stored.size).map_err(|_| ClusterError::CorruptMatrix {
            key: key.to_string(),
            reason: format!("size {} out of range", stored.size),
        })?;
        debug!(key, size, path = %path.display(), "matrix file decoded");
        DistanceMatrix::from_raw(size, stored.values).ok_or_else(|| ClusterError::CorruptMatrix {
            key: key.to_string(),
            reason: format!("value count does not match size {size}"),
        })
    }

    fn save(&self, key: &str, matrix: &DistanceMatrix) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension(format!("{MATRIX_EXTENSION}.tmp"));
        let stored = StoredMatrixRef {
            version: MATRIX_FORMAT_VERSION,
            size: matrix.size() as u64,
            values: matrix.values(),
        };
        {
            let file = File::create(&tmp)?;
            let mut encoder = zstd::stream::Encoder::new(BufWriter::new(file), 3)?;
            bincode::serialize_into(&mut encoder, &stored)?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(key, path = %path.display(), "matrix file written");
        Ok(())
    }
}

/// In-process store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryMatrixStore {
    matrices: Mutex<HashMap<String, DistanceMatrix>>,
}

impl MemoryMatrixStore {
    pub fn len(&self) -> usize {
        self.matrices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.matrices.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl MatrixStore for MemoryMatrixStore {
    fn exists(&self, key: &str) -> Result<bool> {
        validate_cache_key(key)?;
        Ok(self.matrices.lock().contains_key(key))
    }

    fn load(&self, key: &str) -> Result<DistanceMatrix> {
        validate_cache_key(key)?;
        self.matrices
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::CorruptMatrix {
                key: key.to_string(),
                reason: "no matrix stored under this key".to_string(),
            })
    }

    fn save(&self, key: &str, matrix: &DistanceMatrix) -> Result<()> {
        validate_cache_key(key)?;
        self.matrices.lock().insert(key.to_string(), matrix.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys() {
        assert_eq!(cluster_cache_key(17), "cluster_17");
        assert!(validate_cache_key(GLOBAL_CACHE_KEY).is_ok());
        assert!(validate_cache_key("cluster_3").is_ok());
        for bad in ["", "../global", "a/b", ".hidden", "key with space"] {
            assert!(
                matches!(validate_cache_key(bad), Err(ClusterError::InvalidCacheKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMatrixStore::new(dir.path().join("cache"));
        let matrix =
            DistanceMatrix::from_rows(&[vec![0.0, 3.0, 9.0], vec![3.0, 0.0, 2.5], vec![9.0, 2.5, 0.0]])
                .unwrap();
        assert!(!store.exists("global").unwrap());
        store.save("global", &matrix).unwrap();
        assert!(store.exists("global").unwrap());
        assert_eq!(store.load("global").unwrap(), matrix);
        assert!(!dir.path().join("cache/global.matrix.tmp").exists());
        assert!(store.remove("global").unwrap());
        assert!(!store.exists("global").unwrap());
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMatrixStore::new(dir.path());
        let bytes = zstd::stream::encode_all(&b"not a matrix"[..], 3).unwrap();
        fs::write(dir.path().join("global.matrix"), bytes).unwrap();
        assert!(matches!(
            store.load("global"),
            Err(ClusterError::CorruptMatrix { .. })
        ));
    }

    #[test]
    fn memory_store_tracks_keys() {
        let store = MemoryMatrixStore::default();
        store.save("cluster_2", &DistanceMatrix::zeros(1)).unwrap();
        store.save("global", &DistanceMatrix::zeros(2)).unwrap();
        assert_eq!(store.keys(), vec!["cluster_2", "global"]);
        assert!(store.load("cluster_9").is_err());
    }
}
