mod config;
mod export;
mod source;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use firstlines_core::{Engine, FileMatrixStore, GLOBAL_CACHE_KEY};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, AppConfig, DEFAULT_CONFIG};
use crate::source::RecordStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "firstlines", version = VERSION, about = "Cluster manuscript poem first lines")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct Overrides {
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[arg(long = "cache-dir", global = true)]
    cache_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    damping: Option<f64>,
    #[arg(long = "max-iterations", global = true)]
    max_iterations: Option<usize>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    preference: Option<f64>,
    #[arg(long = "min-token-len", global = true)]
    min_token_len: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = dir.clone();
        }
        if let Some(damping) = self.damping {
            config.clustering.damping = damping;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.clustering.max_iterations = max_iterations;
        }
        if let Some(preference) = self.preference {
            config.clustering.preference = Some(preference);
        }
        if let Some(min_token_len) = self.min_token_len {
            config.distance.min_token_len = min_token_len;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cluster every witness by first line.
    Cluster {
        #[arg(long, default_value = "clusters.csv")]
        out: PathBuf,
        #[arg(long = "cache-key", default_value = GLOBAL_CACHE_KEY)]
        cache_key: String,
        /// Also write the assignment to the clusters table for `subcluster`.
        #[arg(long = "store-assignments", action = ArgAction::SetTrue)]
        store_assignments: bool,
    },
    /// Split every stored cluster into subclusters.
    Subcluster {
        #[arg(long, default_value = "subclusters.csv")]
        out: PathBuf,
    },
    /// Build or verify a cached distance matrix without clustering.
    Matrix {
        #[arg(long = "cache-key", default_value = GLOBAL_CACHE_KEY)]
        cache_key: String,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = load_config(&config_path)?;
    cli.overrides.apply(&mut config);

    let engine = Engine::new(config.engine(), FileMatrixStore::new(&config.cache.dir))
        .context("invalid clustering configuration")?;

    match cli.command {
        Commands::Cluster {
            out,
            cache_key,
            store_assignments,
        } => {
            let mut store = RecordStore::open(&config.database)?;
            let records = store.load_first_lines()?;
            info!(records = records.len(), "loaded first lines");
            let assignment = engine.cluster_records(&records, &cache_key)?;
            export::write_clusters_file(&out, &assignment)?;
            info!(
                clusters = assignment.cluster_count(),
                out = %out.display(),
                "clusters written"
            );
            if store_assignments {
                let rows = store.store_clusters(&assignment)?;
                info!(rows, table = %config.database.clusters_table, "cluster table replaced");
            }
        }
        Commands::Subcluster { out } => {
            let store = RecordStore::open(&config.database)?;
            let grouped = store.load_grouped()?;
            let rows: usize = grouped.values().map(Vec::len).sum();
            info!(clusters = grouped.len(), rows, "loaded stored clusters");
            let report = engine.subcluster(&grouped);
            export::write_subclusters_file(&out, &report.assignment)?;
            info!(out = %out.display(), "subclusters written");
            if !report.is_complete() {
                eprintln!(
                    "warning: {} of {} clusters could not be subclustered",
                    report.failures.len(),
                    grouped.len()
                );
            }
        }
        Commands::Matrix { cache_key } => {
            let store = RecordStore::open(&config.database)?;
            let records = store.load_first_lines()?;
            let matrix = engine.matrix(&records, &cache_key)?;
            let (rows, cols) = matrix.shape();
            println!("{cache_key}: {rows}x{cols} matrix ready");
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
