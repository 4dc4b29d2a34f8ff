use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use firstlines_core::{AffinityParams, DistanceConfig, EngineConfig};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "firstlines.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub distance: DistanceConfig,
    pub clustering: AffinityParams,
}

impl AppConfig {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            distance: self.distance,
            affinity: self.clustering,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub details_table: String,
    pub clusters_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("folger_results.db"),
            details_table: "details".to_string(),
            clusters_table: "clusters".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".firstlines-cache"),
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config(Path::new("/nonexistent/firstlines.toml")).unwrap();
        assert_eq!(config.database.details_table, "details");
        assert_eq!(config.clustering.damping, 0.5);
        assert_eq!(config.distance.min_token_len, 4);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [database]
            path = "witnesses.db"

            [clustering]
            damping = 0.8
            preference = -12.0
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("witnesses.db"));
        assert_eq!(config.database.clusters_table, "clusters");
        assert_eq!(config.clustering.damping, 0.8);
        assert_eq!(config.clustering.max_iterations, 1000);
        assert_eq!(config.engine().affinity.preference, Some(-12.0));
        assert_eq!(config.cache.dir, PathBuf::from(".firstlines-cache"));
    }
}
