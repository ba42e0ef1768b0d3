//! Ingestion pre-checks: record identifier, event time, string casting and worker counts.

use crate::data::source::{DataBatch, format_cell};
use crate::error::{PipelineError, Result};
use crate::features::store::{IngestOptions, record_key};
use serde_json::Value;
use std::collections::HashSet;

/// Format of synthesized event times.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Current UTC time as an event-time string.
pub fn event_time_now() -> String {
    chrono::Utc::now().format(EVENT_TIME_FORMAT).to_string()
}

/// Make a batch ingestible into a group keyed by `record_identifier` and `event_time`.
///
/// An existing identifier column must be unique. Missing identifier or event-time
/// columns are synthesized from the index and the current time.
pub fn prepare_for_ingestion(
    mut batch: DataBatch,
    record_identifier: &str,
    event_time: &str,
) -> Result<DataBatch> {
    if batch.has_column(record_identifier) {
        let duplicated = count_duplicates(&batch.column_values(record_identifier)?);
        if duplicated > 0 {
            return Err(PipelineError::dataset(format!(
                "Column {record_identifier} for feature group has {duplicated} duplicated values"
            )));
        }
    } else {
        tracing::warn!(
            column = record_identifier,
            "Record identifier column not found, creating it from the index"
        );
        let ids = batch.index_values();
        batch.set_column(record_identifier, ids)?;
    }

    if !batch.has_column(event_time) {
        let now = event_time_now();
        tracing::warn!(column = event_time, value = %now, "Event time column not found, using current time");
        batch.set_column(event_time, vec![Value::String(now); batch.row_count()])?;
    }

    Ok(cast_object_to_string(batch))
}

/// Identifiers that would land on an already used record key.
fn count_duplicates(values: &[&Value]) -> usize {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| !seen.insert(record_key(v)))
        .count()
}

/// Render every non-null cell of non-numeric columns as a string.
///
/// A column stays untouched when all its non-null cells are numbers or booleans.
pub fn cast_object_to_string(mut batch: DataBatch) -> DataBatch {
    for idx in 0..batch.column_count() {
        let is_object = batch
            .rows
            .iter()
            .map(|row| &row[idx])
            .any(|v| !matches!(v, Value::Null | Value::Number(_) | Value::Bool(_)));
        if !is_object {
            continue;
        }
        for row in &mut batch.rows {
            if !row[idx].is_null() && !row[idx].is_string() {
                row[idx] = Value::String(format_cell(&row[idx]));
            }
        }
    }
    batch
}

/// Worker counts for a batch: one worker per `rows_per_worker` rows (at least one), and
/// as many concurrent chunks as the machine has cores.
pub fn ingest_options(rows: usize, rows_per_worker: usize) -> IngestOptions {
    let max_workers = (rows as f64 / rows_per_worker.max(1) as f64).round_ties_even() as usize;
    let max_processes = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    IngestOptions {
        max_workers: max_workers.max(1),
        max_processes,
    }
}
