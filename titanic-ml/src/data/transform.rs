//! Declarative transformation pipeline over [`DataBatch`].

use crate::data::schema::{ColumnType, as_f64, cast_value};
use crate::data::source::DataBatch;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Lower-cased string cells treated as missing by [`TransformStep::NormalizeNulls`].
pub const NULL_LIKE: &[&str] = &["nan", "null", "none", "na", "n/a", "<na>"];

/// A transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Trim, lower-case and snake-case every column name except the index.
    NormalizeColumnNames,
    /// Drop a column. A missing column is an error.
    DropColumn {
        column: String,
    },
    /// Rename a column when it exists.
    RenameColumn {
        from: String,
        to: String,
    },
    /// Turn blank and null-like strings into `Null`, in the given columns or all of them.
    NormalizeNulls {
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    /// Cast a column. With `optional` set, a missing column is skipped.
    Cast {
        column: String,
        dtype: ColumnType,
        #[serde(default)]
        optional: bool,
    },
    /// Look each value up in `mapping` and write the result to `output`.
    MapValues {
        column: String,
        output: String,
        mapping: BTreeMap<String, Value>,
        #[serde(default)]
        dtype: Option<ColumnType>,
    },
    /// Right-closed bucketing: value in `(boundaries[i], boundaries[i + 1]]` gets `labels[i]`.
    Bucketize {
        column: String,
        output: String,
        boundaries: Vec<f64>,
        labels: Vec<String>,
    },
    /// `when_true` where every column equals `equals`, `when_false` otherwise.
    ConditionFlag {
        columns: Vec<String>,
        equals: Value,
        output: String,
        when_true: Value,
        when_false: Value,
    },
    /// Multiply a numeric column by a constant.
    Scale {
        column: String,
        factor: f64,
    },
}

impl TransformStep {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NormalizeColumnNames => "normalize_column_names",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::NormalizeNulls { .. } => "normalize_nulls",
            Self::Cast { .. } => "cast",
            Self::MapValues { .. } => "map_values",
            Self::Bucketize { .. } => "bucketize",
            Self::ConditionFlag { .. } => "condition_flag",
            Self::Scale { .. } => "scale",
        }
    }
}

/// A pipeline of transformation steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformPipeline {
    pub steps: Vec<TransformStep>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Apply the pipeline to a data batch.
    pub fn apply(&self, batch: DataBatch) -> Result<DataBatch> {
        self.apply_recorded(batch).map(|(batch, _)| batch)
    }

    /// Apply the pipeline and return one [`TransformRecord`] per step.
    pub fn apply_recorded(&self, mut batch: DataBatch) -> Result<(DataBatch, Vec<TransformRecord>)> {
        let mut records = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let rows_before = batch.row_count();
            batch = apply_step(batch, step)?;
            batch.sync_total_rows();
            tracing::debug!(
                transform = step.kind(),
                columns = batch.column_count(),
                "Applied transform"
            );
            records.push(TransformRecord {
                step: step.clone(),
                applied_at: chrono::Utc::now(),
                rows_before,
                rows_after: batch.row_count(),
            });
        }
        Ok((batch, records))
    }
}

/// Normalize one column name: trim, lower-case, spaces to underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase().trim().replace(' ', "_")
}

/// Whether a cell is missing or a null-like string.
pub fn is_null_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.is_empty() || NULL_LIKE.contains(&trimmed.to_lowercase().as_str())
        }
        _ => false,
    }
}

fn lookup_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn apply_step(mut batch: DataBatch, step: &TransformStep) -> Result<DataBatch> {
    match step {
        TransformStep::NormalizeColumnNames => {
            let index = batch.index.clone();
            let renamed: Vec<String> = batch
                .columns
                .iter()
                .map(|c| {
                    if index.as_deref() == Some(c.as_str()) {
                        c.clone()
                    } else {
                        normalize_column_name(c)
                    }
                })
                .collect();
            let mut seen = HashSet::new();
            for name in &renamed {
                if !seen.insert(name.as_str()) {
                    return Err(PipelineError::dataset(format!(
                        "Column names collide after normalization: '{name}'"
                    )));
                }
            }
            batch.columns = renamed;
            Ok(batch)
        }
        TransformStep::DropColumn { column } => {
            batch.drop_column(column)?;
            Ok(batch)
        }
        TransformStep::RenameColumn { from, to } => {
            batch.rename_column(from, to)?;
            Ok(batch)
        }
        TransformStep::NormalizeNulls { columns } => {
            let targets: Vec<String> = match columns {
                Some(cols) => cols.clone(),
                None => batch.columns.clone(),
            };
            for column in &targets {
                batch.map_column(column, |_, cell| {
                    Ok(if is_null_like(cell) {
                        Value::Null
                    } else {
                        cell.clone()
                    })
                })?;
            }
            Ok(batch)
        }
        TransformStep::Cast {
            column,
            dtype,
            optional,
        } => {
            if *optional && !batch.has_column(column) {
                return Ok(batch);
            }
            batch.map_column(column, |pos, cell| {
                cast_value(cell, *dtype).ok_or_else(|| {
                    PipelineError::dataset(format!(
                        "Column '{column}' row {pos}: cannot cast {cell} to {dtype}"
                    ))
                })
            })?;
            Ok(batch)
        }
        TransformStep::MapValues {
            column,
            output,
            mapping,
            dtype,
        } => {
            let source = batch.column_values(column)?;
            let mut mapped = Vec::with_capacity(source.len());
            for (pos, cell) in source.into_iter().enumerate() {
                if cell.is_null() {
                    mapped.push(Value::Null);
                    continue;
                }
                let key = lookup_key(cell);
                let value = mapping.get(&key).ok_or_else(|| {
                    PipelineError::dataset(format!(
                        "Column '{column}' row {pos}: no mapping for '{key}'"
                    ))
                })?;
                let value = match dtype {
                    Some(t) => cast_value(value, *t).ok_or_else(|| {
                        PipelineError::dataset(format!(
                            "Column '{output}': cannot cast mapped value {value} to {t}"
                        ))
                    })?,
                    None => value.clone(),
                };
                mapped.push(value);
            }
            batch.set_column(output, mapped)?;
            Ok(batch)
        }
        TransformStep::Bucketize {
            column,
            output,
            boundaries,
            labels,
        } => {
            if boundaries.len() < 2 || labels.len() != boundaries.len() - 1 {
                return Err(PipelineError::invalid_input(format!(
                    "Bucketize '{column}': {} boundaries need {} labels, got {}",
                    boundaries.len(),
                    boundaries.len().saturating_sub(1),
                    labels.len()
                )));
            }
            if boundaries.windows(2).any(|w| w[0] >= w[1]) {
                return Err(PipelineError::invalid_input(format!(
                    "Bucketize '{column}': boundaries must increase strictly"
                )));
            }
            let source = batch.column_values(column)?;
            let mut buckets = Vec::with_capacity(source.len());
            for (pos, cell) in source.into_iter().enumerate() {
                if cell.is_null() {
                    buckets.push(Value::Null);
                    continue;
                }
                let x = as_f64(cell).ok_or_else(|| {
                    PipelineError::dataset(format!(
                        "Column '{column}' row {pos}: {cell} is not numeric"
                    ))
                })?;
                let label = boundaries
                    .windows(2)
                    .position(|w| x > w[0] && x <= w[1])
                    .map(|i| Value::String(labels[i].clone()))
                    .unwrap_or(Value::Null);
                buckets.push(label);
            }
            batch.set_column(output, buckets)?;
            Ok(batch)
        }
        TransformStep::ConditionFlag {
            columns,
            equals,
            output,
            when_true,
            when_false,
        } => {
            let indices = columns
                .iter()
                .map(|c| {
                    batch
                        .column_index(c)
                        .ok_or_else(|| PipelineError::dataset(format!("Column '{c}' not found")))
                })
                .collect::<Result<Vec<_>>>()?;
            let flags = batch
                .rows
                .iter()
                .map(|row| {
                    if indices.iter().all(|&i| values_equal(&row[i], equals)) {
                        when_true.clone()
                    } else {
                        when_false.clone()
                    }
                })
                .collect();
            batch.set_column(output, flags)?;
            Ok(batch)
        }
        TransformStep::Scale { column, factor } => {
            batch.map_column(column, |pos, cell| match cell {
                Value::Null => Ok(Value::Null),
                Value::Number(n) => {
                    // Integers stay integers unless the product leaves the i64 range.
                    if factor.fract() == 0.0 && factor.abs() <= i64::MAX as f64 {
                        if let Some(scaled) = n.as_i64().and_then(|i| i.checked_mul(*factor as i64)) {
                            return Ok(Value::from(scaled));
                        }
                    }
                    let scaled = n.as_f64().unwrap_or_default() * factor;
                    Ok(serde_json::Number::from_f64(scaled)
                        .map(Value::Number)
                        .unwrap_or(Value::Null))
                }
                other => Err(PipelineError::dataset(format!(
                    "Column '{column}' row {pos}: cannot scale {other}"
                ))),
            })?;
            Ok(batch)
        }
    }
}

/// Record of a transform applied (for lineage tracking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRecord {
    pub step: TransformStep,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub rows_before: usize,
    pub rows_after: usize,
}
