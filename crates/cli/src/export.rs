use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use firstlines_core::{ClusterAssignment, SubclusterAssignment};

pub fn write_clusters<W: Write>(writer: W, assignment: &ClusterAssignment) -> Result<()> {
    let mut csv = Writer::from_writer(writer);
    csv.write_record(["Cluster", "Index", "First Line"])?;
    for (label, id, text) in assignment.rows() {
        csv.write_record([label.to_string().as_str(), id, text])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_subclusters<W: Write>(writer: W, assignment: &SubclusterAssignment) -> Result<()> {
    let mut csv = Writer::from_writer(writer);
    csv.write_record(["Cluster", "Subcluster", "Witness ID", "First Line"])?;
    for (parent, sub, id, text) in assignment.rows() {
        csv.write_record([
            parent.to_string().as_str(),
            sub.to_string().as_str(),
            id,
            text,
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_clusters_file(path: &Path, assignment: &ClusterAssignment) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_clusters(file, assignment)
}

pub fn write_subclusters_file(path: &Path, assignment: &SubclusterAssignment) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_subclusters(file, assignment)
}
