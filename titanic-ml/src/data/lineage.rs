//! Hash-chained lineage of the steps and transforms a dataset went through.

use crate::data::source::DataBatch;
use crate::data::transform::TransformRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One link of the chain: a step, what it applied and a digest of what it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEntry {
    pub step_name: String,
    pub transforms: Vec<TransformRecord>,
    pub output_digest: String,
    pub rows: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Full lineage record for a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLineage {
    pub dataset_id: String,
    pub source_location: String,
    pub entries: Vec<LineageEntry>,
    pub created_at: DateTime<Utc>,
    pub hash_chain: Vec<String>,
}

impl DataLineage {
    pub fn new(dataset_id: &str, source_location: &str) -> Self {
        let initial_hash = compute_hash(&format!("{dataset_id}:{source_location}"));
        Self {
            dataset_id: dataset_id.to_string(),
            source_location: source_location.to_string(),
            entries: Vec::new(),
            created_at: Utc::now(),
            hash_chain: vec![initial_hash],
        }
    }

    /// Append a step and extend the hash chain.
    pub fn record_step(
        &mut self,
        step_name: &str,
        transforms: Vec<TransformRecord>,
        output: &DataBatch,
    ) {
        let entry = LineageEntry {
            step_name: step_name.to_string(),
            transforms,
            output_digest: digest_batch(output),
            rows: output.row_count(),
            recorded_at: Utc::now(),
        };
        let prev_hash = self.hash_chain.last().cloned().unwrap_or_default();
        self.hash_chain.push(link_hash(&prev_hash, &entry));
        self.entries.push(entry);
    }

    /// Latest chain head.
    pub fn head(&self) -> &str {
        self.hash_chain.last().map(String::as_str).unwrap_or_default()
    }

    /// Recompute the chain and compare it with the stored hashes.
    pub fn verify_integrity(&self) -> bool {
        if self.hash_chain.len() != self.entries.len() + 1 {
            return false;
        }
        let expected_initial =
            compute_hash(&format!("{}:{}", self.dataset_id, self.source_location));
        if self.hash_chain[0] != expected_initial {
            return false;
        }
        self.entries
            .iter()
            .enumerate()
            .all(|(i, entry)| self.hash_chain[i + 1] == link_hash(&self.hash_chain[i], entry))
    }
}

fn link_hash(prev: &str, entry: &LineageEntry) -> String {
    let steps: Vec<_> = entry.transforms.iter().map(|t| &t.step).collect();
    let steps_json = serde_json::to_string(&steps).unwrap_or_default();
    compute_hash(&format!(
        "{prev}:{}:{steps_json}:{}",
        entry.step_name, entry.output_digest
    ))
}

/// SHA-256 over the column names and rows of a batch.
pub fn digest_batch(batch: &DataBatch) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(&batch.columns).unwrap_or_default());
    for row in &batch.rows {
        hasher.update(serde_json::to_string(row).unwrap_or_default());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
