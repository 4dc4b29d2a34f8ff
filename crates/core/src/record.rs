use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};

/// Label of a top-level cluster. Labels are exemplar indices and carry no
/// ordering beyond sort stability.
pub type ClusterLabel = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub text: String,
}

impl Record {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

pub fn ensure_unique_ids(records: &[Record]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(ClusterError::DuplicateRecordId(record.id.clone()));
        }
    }
    Ok(())
}

/// Records paired with the label of the cluster they landed in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub entries: Vec<(ClusterLabel, Record)>,
}

impl ClusterAssignment {
    pub fn from_labels(records: &[Record], labels: &[ClusterLabel]) -> Self {
        let entries = labels
            .iter()
            .copied()
            .zip(records.iter().cloned())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn label_of(&self, id: &str) -> Option<ClusterLabel> {
        self.entries
            .iter()
            .find(|(_, record)| record.id == id)
            .map(|(label, _)| *label)
    }

    pub fn cluster_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(label, _)| *label)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Members per label, labels ascending, members in input order.
    pub fn groups(&self) -> BTreeMap<ClusterLabel, Vec<Record>> {
        let mut groups: BTreeMap<ClusterLabel, Vec<Record>> = BTreeMap::new();
        for (label, record) in &self.entries {
            groups.entry(*label).or_default().push(record.clone());
        }
        groups
    }

    /// `(cluster_label, record_id, text)` rows for tabular export.
    pub fn rows(&self) -> Vec<(ClusterLabel, &str, &str)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|(label, record)| (*label, record.id.as_str(), record.text.as_str()))
            .collect();
        rows.sort_by_key(|(label, _, _)| *label);
        rows
    }
}

/// Subcluster labels are only meaningful together with their parent label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubclusterAssignment {
    pub clusters: BTreeMap<ClusterLabel, ClusterAssignment>,
}

impl SubclusterAssignment {
    pub fn insert(&mut self, parent: ClusterLabel, assignment: ClusterAssignment) {
        self.clusters.insert(parent, assignment);
    }

    pub fn get(&self, parent: ClusterLabel) -> Option<&ClusterAssignment> {
        self.clusters.get(&parent)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// `(cluster_label, subcluster_label, record_id, text)` rows.
    pub fn rows(&self) -> Vec<(ClusterLabel, ClusterLabel, &str, &str)> {
        self.clusters
            .iter()
            .flat_map(|(parent, assignment)| {
                assignment
                    .rows()
                    .into_iter()
                    .map(move |(sub, id, text)| (*parent, sub, id, text))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_ids() {
        let records = vec![Record::new("1", "a"), Record::new("1", "b")];
        assert!(matches!(
            ensure_unique_ids(&records),
            Err(ClusterError::DuplicateRecordId(id)) if id == "1"
        ));
    }

    #[test]
    fn rows_are_ordered_by_label_then_input() {
        let records = vec![
            Record::new("a", "x"),
            Record::new("b", "y"),
            Record::new("c", "z"),
        ];
        let assignment = ClusterAssignment::from_labels(&records, &[2, 0, 2]);
        let ids: Vec<_> = assignment.rows().iter().map(|(_, id, _)| *id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(assignment.cluster_count(), 2);
        assert_eq!(assignment.groups()[&2].len(), 2);
    }
}
