//! Result merging: normalize, deduplicate and resolve conflicts by source priority
//!
//! Records from every source are grouped by [`NormalizedKey`]. Within a group:
//!
//! - display identifier comes from the highest-priority contributing source
//! - display name comes from the same source, even when it is empty
//! - each metadata field takes the first non-null value in priority order
//! - the artifact flag is set if any contributor has the artifact
//!
//! Output is sorted in natural identifier order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::normalize::{NormalizedKey, natural_cmp};
use crate::source::RawRecord;

/// Records returned by one source for one query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBatch {
    /// Id of the source that produced the records
    pub source_id: String,
    /// Records as the source reported them
    pub records: Vec<RawRecord>,
}

impl SourceBatch {
    /// Group records under a source id
    pub fn new(source_id: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            source_id: source_id.into(),
            records,
        }
    }
}

/// One merged record per normalized identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Normalized identifier
    pub key: NormalizedKey,
    /// Identifier as written by the highest-priority contributor
    pub identifier: String,
    /// Display name
    pub name: String,
    /// Contributing source ids in priority order; never empty
    pub sources: Vec<String>,
    /// Merged metadata
    pub fields: BTreeMap<String, String>,
    /// Whether any contributor can deliver the artifact
    pub has_artifact: bool,
    /// The contributing raw records in priority order
    pub records: Vec<RawRecord>,
}

impl CanonicalRecord {
    /// Whether `source_id` contributed to this record
    pub fn contributed_by(&self, source_id: &str) -> bool {
        self.sources.iter().any(|s| s == source_id)
    }

    /// The raw record a given source reported
    pub fn record_from(&self, source_id: &str) -> Option<&RawRecord> {
        self.records.iter().find(|r| r.source_id == source_id)
    }

    /// A merged metadata field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// "<identifier> <name>", or just the identifier when there is no name
    pub fn display_label(&self) -> String {
        if self.name.trim().is_empty() {
            self.identifier.clone()
        } else {
            format!("{} {}", self.identifier, self.name)
        }
    }
}

struct Ranked {
    rank: usize,
    seq: usize,
    record: RawRecord,
}

/// Merge per-source batches into canonical records
///
/// `priority` lists source ids from highest to lowest precedence. Sources not
/// in the list rank below every listed source, in the order their batches
/// appear. Records whose identifier normalizes to nothing are dropped.
pub fn merge_records(batches: Vec<SourceBatch>, priority: &[String]) -> Vec<CanonicalRecord> {
    let mut groups: HashMap<NormalizedKey, Vec<Ranked>> = HashMap::new();
    let mut seq = 0;

    for (batch_idx, batch) in batches.into_iter().enumerate() {
        let rank = priority
            .iter()
            .position(|id| *id == batch.source_id)
            .unwrap_or(priority.len() + batch_idx);
        for mut record in batch.records {
            let Some(key) = NormalizedKey::new(&record.identifier) else {
                tracing::debug!(source = %batch.source_id, "dropping record with blank identifier");
                continue;
            };
            record.source_id.clone_from(&batch.source_id);
            groups.entry(key).or_default().push(Ranked { rank, seq, record });
            seq += 1;
        }
    }

    let mut merged: Vec<CanonicalRecord> = groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|m| (m.rank, m.seq));
            resolve(key, members)
        })
        .collect();

    merged.sort_by(|a, b| {
        natural_cmp(&a.identifier, &b.identifier).then_with(|| a.key.cmp(&b.key))
    });
    merged
}

// `members` is non-empty and already in priority order.
fn resolve(key: NormalizedKey, members: Vec<Ranked>) -> CanonicalRecord {
    let records: Vec<RawRecord> = members.into_iter().map(|m| m.record).collect();

    let (identifier, name) = records
        .first()
        .map(|r| (r.identifier.trim().to_string(), r.name.trim().to_string()))
        .unwrap_or_default();

    let mut sources: Vec<String> = Vec::new();
    let mut fields = BTreeMap::new();
    for record in &records {
        if !sources.contains(&record.source_id) {
            sources.push(record.source_id.clone());
        }
        for field in record.fields.keys() {
            if let Some(value) = record.field(field) {
                fields
                    .entry(field.clone())
                    .or_insert_with(|| value.to_string());
            }
        }
    }
    let has_artifact = records.iter().any(|r| r.has_artifact);

    CanonicalRecord {
        key,
        identifier,
        name,
        sources,
        fields,
        has_artifact,
        records,
    }
}
