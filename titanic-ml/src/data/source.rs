//! Tabular data batches and the CSV source/sink the steps read and write.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Raw tokens read as missing values.
pub const MISSING_TOKENS: &[&str] = &[
    "", "NaN", "nan", "-NaN", "-nan", "NA", "N/A", "n/a", "NULL", "null", "None", "<NA>", "#N/A",
];

/// A batch of data rows.
///
/// `index` names the column acting as the row index (e.g. `PassengerId`). It travels with
/// the rows like any other column but is exempt from renames and drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub total_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl DataBatch {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
            index: None,
        }
    }

    /// Build a batch, checking every row has one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.as_str()) {
                return Err(PipelineError::dataset(format!("Duplicate column '{col}'")));
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(PipelineError::dataset(format!(
                "Row {i} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        let total_rows = rows.len();
        Ok(Self {
            columns,
            rows,
            total_rows,
            index: None,
        })
    }

    /// Mark an existing column as the index.
    pub fn with_index(mut self, column: &str) -> Result<Self> {
        if !self.has_column(column) {
            return Err(PipelineError::dataset(format!(
                "Index column '{column}' not found"
            )));
        }
        self.index = Some(column.to_string());
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_index(&self, name: &str) -> bool {
        self.index.as_deref() == Some(name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::dataset(format!("Column '{name}' not found")))
    }

    /// Borrow the values of one column.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Index values, or the row positions when the batch has no index.
    pub fn index_values(&self) -> Vec<Value> {
        match self.index.as_deref().and_then(|name| self.column_index(name)) {
            Some(idx) => self.rows.iter().map(|row| row[idx].clone()).collect(),
            None => (0..self.rows.len()).map(|i| Value::from(i as u64)).collect(),
        }
    }

    /// Replace a column's values, or append the column when it does not exist yet.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::dataset(format!(
                "Column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Remove a column; missing columns and the index column are errors.
    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        if self.is_index(name) {
            return Err(PipelineError::dataset(format!(
                "Cannot drop index column '{name}'"
            )));
        }
        let idx = self.require_column(name)?;
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        Ok(())
    }

    /// Rename a column. Returns `false` when `from` does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<bool> {
        let Some(idx) = self.column_index(from) else {
            return Ok(false);
        };
        if from != to && self.has_column(to) {
            return Err(PipelineError::dataset(format!(
                "Cannot rename '{from}' to existing column '{to}'"
            )));
        }
        self.columns[idx] = to.to_string();
        if self.is_index(from) {
            self.index = Some(to.to_string());
        }
        Ok(true)
    }

    /// Rewrite every cell of a column through `f(row_position, cell)`.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &Value) -> Result<Value>,
    {
        let idx = self.require_column(name)?;
        for (pos, row) in self.rows.iter_mut().enumerate() {
            row[idx] = f(pos, &row[idx])?;
        }
        Ok(())
    }

    /// Rows as `column -> value` maps, in column order.
    pub fn records(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    pub(crate) fn sync_total_rows(&mut self) {
        self.total_rows = self.rows.len();
    }
}

/// Parse a raw CSV field into a cell value.
pub fn parse_cell(raw: &str) -> Value {
    if MISSING_TOKENS.contains(&raw) {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    match raw {
        "True" | "true" => Value::Bool(true),
        "False" | "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Render a cell for CSV output. `Null` becomes an empty field.
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Parse CSV text into a batch.
pub fn parse_csv(
    content: &str,
    delimiter: u8,
    index_column: Option<&str>,
    limit: Option<usize>,
) -> Result<DataBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.is_empty() || (columns.len() == 1 && columns[0].is_empty()) {
        return Err(PipelineError::dataset("Empty CSV file"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        if limit.is_some_and(|max| rows.len() >= max) {
            break;
        }
        let record = record?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    let batch = DataBatch::new(columns, rows)?;
    match index_column {
        Some(index) => batch.with_index(index),
        None => Ok(batch),
    }
}

/// Render a batch as CSV text, header first.
pub fn to_csv_string(batch: &DataBatch, delimiter: u8) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(&batch.columns)?;
    for row in &batch.rows {
        writer.write_record(row.iter().map(format_cell))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::dataset(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| PipelineError::dataset(format!("CSV is not UTF-8: {e}")))
}

/// Write a batch to `path` atomically.
pub fn write_csv(batch: &DataBatch, path: &Path) -> Result<()> {
    let content = to_csv_string(batch, b',')?;
    titanic_core::persistence::atomic_write(path, content.as_bytes())?;
    Ok(())
}

/// Trait for loading data from a source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Load data from this source, optionally limiting the number of rows.
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch>;
}

/// CSV file data source.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: u8,
    pub index_column: Option<String>,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            index_column: None,
        }
    }

    pub fn with_index(mut self, column: impl Into<String>) -> Self {
        self.index_column = Some(column.into());
        self
    }

    fn read(&self, content: &str, limit: Option<usize>) -> Result<DataBatch> {
        let parsed = parse_csv(content, self.delimiter, self.index_column.as_deref(), limit);
        parsed.map_err(|e| match e {
            PipelineError::Dataset(msg) => {
                PipelineError::Dataset(format!("{}: {msg}", self.path.display()))
            }
            other => other,
        })
    }
}

#[async_trait]
impl DataSource for CsvSource {
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::dataset(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        self.read(&content, limit)
    }
}
