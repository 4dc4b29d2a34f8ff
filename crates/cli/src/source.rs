use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use firstlines_core::{ClusterAssignment, ClusterLabel, Record};
use rusqlite::types::Value;
use rusqlite::{params, Connection};

use crate::config::DatabaseConfig;

/// Read side of the scraped witness database, plus the `clusters` table that
/// subclustering reads back.
pub struct RecordStore {
    conn: Connection,
    details: String,
    clusters: String,
}

impl RecordStore {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = Connection::open(&config.path)
            .with_context(|| format!("failed to open database {}", config.path.display()))?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: &DatabaseConfig) -> Result<Self> {
        Ok(Self {
            conn,
            details: quote_identifier(&config.details_table)?,
            clusters: quote_identifier(&config.clusters_table)?,
        })
    }

    /// Every witness ordered by its first line.
    pub fn load_first_lines(&self) -> Result<Vec<Record>> {
        let sql = format!(
            r#"SELECT id, "First Line" FROM {} ORDER BY "First Line";"#,
            self.details
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Value>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (id, text) = row?;
            records.push(Record::new(value_to_id(id)?, text.unwrap_or_default()));
        }
        Ok(records)
    }

    /// Members of every stored cluster, each group ordered by witness id.
    pub fn load_grouped(&self) -> Result<BTreeMap<ClusterLabel, Vec<Record>>> {
        let sql = format!(
            r#"SELECT c.cluster, d.id, d."First Line"
               FROM {clusters} AS c
               JOIN {details} AS d ON d.id = c."Index"
               ORDER BY c.cluster, d.id;"#,
            clusters = self.clusters,
            details = self.details,
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("failed to query clusters; run `firstlines cluster --store-assignments` first")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Value>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut grouped: BTreeMap<ClusterLabel, Vec<Record>> = BTreeMap::new();
        for row in rows {
            let (cluster, id, text) = row?;
            let label = ClusterLabel::try_from(cluster)
                .map_err(|_| anyhow!("negative cluster label {cluster}"))?;
            grouped
                .entry(label)
                .or_default()
                .push(Record::new(value_to_id(id)?, text.unwrap_or_default()));
        }
        Ok(grouped)
    }

    /// Replaces the clusters table with `assignment`.
    pub fn store_clusters(&mut self, assignment: &ClusterAssignment) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            r#"DROP TABLE IF EXISTS {clusters};
               CREATE TABLE {clusters} (
                   cluster INTEGER NOT NULL,
                   "Index" TEXT NOT NULL,
                   "First Line" TEXT
               );"#,
            clusters = self.clusters,
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                r#"INSERT INTO {} (cluster, "Index", "First Line") VALUES (?1, ?2, ?3)"#,
                self.clusters
            ))?;
            for (label, id, text) in assignment.rows() {
                let label = i64::try_from(label)?;
                stmt.execute(params![label, id, text])?;
            }
        }
        tx.commit()?;
        Ok(assignment.len())
    }
}

fn value_to_id(value: Value) -> Result<String> {
    match value {
        Value::Integer(v) => Ok(v.to_string()),
        Value::Text(v) => Ok(v),
        Value::Real(v) => Ok(v.to_string()),
        Value::Null => bail!("witness with NULL id"),
        Value::Blob(_) => bail!("witness id stored as a blob"),
    }
}

fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid table name {name:?}");
    }
    Ok(format!("\"{name}\""))
}
