//! Feature store seam and a file-backed implementation.
//!
//! `LocalFeatureStore` lays groups out per region:
//!
//! ```text
//! <base_dir>/<region>/registry.json
//! <base_dir>/<region>/<group>/<record_id>.json
//! ```
//!
//! Record ids are percent-encoded into file names so distinct ids never share a file.

use crate::data::source::{DataBatch, format_cell};
use crate::error::{PipelineError, Result};
use crate::features::definition::FeatureGroupDescription;
use crate::features::registry::FeatureRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// A stored feature record.
pub type Record = Map<String, Value>;

/// Parallelism knobs for [`FeatureStore::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Number of contiguous row chunks.
    pub max_workers: usize,
    /// Chunks processed at the same time.
    pub max_processes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_workers: 1,
            max_processes: 1,
        }
    }
}

/// Outcome of an ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub feature_group: String,
    pub total_rows: usize,
    pub chunks: usize,
    pub ingested: usize,
    /// Row positions that could not be stored.
    pub failed_rows: Vec<usize>,
}

/// Feature store operations used by the ingestion step and the CLI.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn create_group(&self, description: FeatureGroupDescription) -> Result<()>;

    async fn describe(&self, group: &str) -> Result<FeatureGroupDescription>;

    async fn list_groups(&self) -> Result<Vec<FeatureGroupDescription>>;

    async fn delete_group(&self, group: &str) -> Result<()>;

    /// Put every row of `batch` as a record of `group`.
    async fn ingest(
        &self,
        group: &str,
        batch: &DataBatch,
        options: IngestOptions,
    ) -> Result<IngestionReport>;

    /// Latest record stored under `record_id`, if any.
    async fn get_record(&self, group: &str, record_id: &str) -> Result<Option<Record>>;
}

/// File-backed feature store.
pub struct LocalFeatureStore {
    base_dir: PathBuf,
    region: String,
    registry_lock: Mutex<()>,
}

impl LocalFeatureStore {
    pub fn new(base_dir: impl Into<PathBuf>, region: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            region: region.to_string(),
            registry_lock: Mutex::new(()),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn region_dir(&self) -> PathBuf {
        self.base_dir.join(&self.region)
    }

    fn registry_path(&self) -> PathBuf {
        self.region_dir().join("registry.json")
    }

    fn group_dir(&self, group: &str) -> Result<PathBuf> {
        validate_group_name(group)?;
        Ok(self.region_dir().join(group))
    }

    fn load_registry(&self) -> Result<FeatureRegistry> {
        FeatureRegistry::load(&self.registry_path())
    }
}

#[async_trait]
impl FeatureStore for LocalFeatureStore {
    async fn create_group(&self, mut description: FeatureGroupDescription) -> Result<()> {
        validate_group_name(&description.name)?;
        if description.feature(&description.record_identifier_feature_name).is_none() {
            return Err(PipelineError::invalid_input(format!(
                "Record identifier '{}' is not a feature of '{}'",
                description.record_identifier_feature_name, description.name
            )));
        }
        if description.feature(&description.event_time_feature_name).is_none() {
            return Err(PipelineError::invalid_input(format!(
                "Event time feature '{}' is not a feature of '{}'",
                description.event_time_feature_name, description.name
            )));
        }
        description.region = self.region.clone();

        let _guard = self.registry_lock.lock().await;
        let mut registry = self.load_registry()?;
        let name = description.name.clone();
        registry.add_group(description)?;
        registry.save(&self.registry_path())?;
        tracing::info!(group = %name, region = %self.region, "Created feature group");
        Ok(())
    }

    async fn describe(&self, group: &str) -> Result<FeatureGroupDescription> {
        self.load_registry()?
            .find_group(group)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(format!("Feature group '{group}'")))
    }

    async fn list_groups(&self) -> Result<Vec<FeatureGroupDescription>> {
        Ok(self.load_registry()?.groups)
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        let _guard = self.registry_lock.lock().await;
        let mut registry = self.load_registry()?;
        if !registry.remove_group(group) {
            return Err(PipelineError::not_found(format!("Feature group '{group}'")));
        }
        registry.save(&self.registry_path())?;

        let dir = self.group_dir(group)?;
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tracing::info!(group, region = %self.region, "Deleted feature group");
        Ok(())
    }

    async fn ingest(
        &self,
        group: &str,
        batch: &DataBatch,
        options: IngestOptions,
    ) -> Result<IngestionReport> {
        let description = Arc::new(self.describe(group).await?);
        let dir = Arc::new(self.group_dir(group)?);
        let columns = Arc::new(batch.columns.clone());

        let total_rows = batch.row_count();
        let workers = options.max_workers.max(1);
        let chunk_size = total_rows.div_ceil(workers).max(1);
        let semaphore = Arc::new(Semaphore::new(options.max_processes.max(1)));

        let mut tasks = JoinSet::new();
        let mut chunks = 0;
        for (n, rows) in batch.rows.chunks(chunk_size).enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::feature_store(e.to_string()))?;
            let offset = n * chunk_size;
            let rows = rows.to_vec();
            let description = description.clone();
            let dir = dir.clone();
            let columns = columns.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                ingest_chunk(&dir, &description, &columns, &rows, offset)
            });
            chunks += 1;
        }
        tracing::debug!(group, chunks, chunk_size, "Dispatched ingestion chunks");

        let mut report = IngestionReport {
            feature_group: group.to_string(),
            total_rows,
            chunks,
            ingested: 0,
            failed_rows: Vec::new(),
        };
        while let Some(joined) = tasks.join_next().await {
            report.failed_rows.extend(joined?);
        }
        report.failed_rows.sort_unstable();
        report.ingested = total_rows - report.failed_rows.len();
        Ok(report)
    }

    async fn get_record(&self, group: &str, record_id: &str) -> Result<Option<Record>> {
        let path = record_path(&self.group_dir(group)?, record_id);
        self.describe(group).await?;
        Ok(titanic_core::persistence::load_json(&path)?)
    }
}

/// Store one chunk of rows, returning the global positions of the rows that failed.
fn ingest_chunk(
    dir: &Path,
    description: &FeatureGroupDescription,
    columns: &[String],
    rows: &[Vec<Value>],
    offset: usize,
) -> Vec<usize> {
    let mut failed = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let position = offset + i;
        let record: Record = columns.iter().cloned().zip(row.iter().cloned()).collect();
        if let Err(e) = put_record(dir, description, record) {
            tracing::debug!(row = position, error = %e, "Failed to ingest row");
            failed.push(position);
        }
    }
    failed
}

/// Write one record, keeping whichever of the old and new record has the newer event time.
fn put_record(dir: &Path, description: &FeatureGroupDescription, record: Record) -> Result<()> {
    if let Some(unknown) = record.keys().find(|k| description.feature(k).is_none()) {
        return Err(PipelineError::feature_store(format!(
            "Feature '{unknown}' is not defined in group '{}'",
            description.name
        )));
    }
    let id = record
        .get(&description.record_identifier_feature_name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| PipelineError::feature_store("Record identifier is missing"))?;
    let event_time = record
        .get(&description.event_time_feature_name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| PipelineError::feature_store("Event time is missing"))?;

    let path = record_path(dir, &record_key(id));
    let existing: Option<Record> = titanic_core::persistence::load_json(&path)?;
    if let Some(old_time) = existing
        .as_ref()
        .and_then(|old| old.get(&description.event_time_feature_name))
    {
        if compare_event_times(event_time, old_time) == Ordering::Less {
            return Ok(());
        }
    }
    titanic_core::persistence::atomic_write_json(&path, &record)?;
    Ok(())
}

/// Feature group names are ASCII letters, digits, `-` and `_`, at most 64 characters.
fn validate_group_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PipelineError::invalid_input(format!(
            "Invalid feature group name '{name}': use letters, digits, '-' or '_' (max 64)"
        )))
    }
}

/// Key a record is stored under. Integral floats key like the integer they hold.
pub(crate) fn record_key(id: &Value) -> String {
    match id {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        other => format_cell(other),
    }
}

fn record_path(dir: &Path, record_id: &str) -> PathBuf {
    dir.join(format!("{}.json", urlencoding::encode(record_id)))
}

/// Compare event times given as RFC 3339 strings or as numbers (epoch seconds).
fn compare_event_times(a: &Value, b: &Value) -> Ordering {
    fn parse(v: &Value) -> Option<f64> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.timestamp_micros() as f64 / 1e6),
            _ => None,
        }
    }
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => format_cell(a).cmp(&format_cell(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::definition::{FeatureDefinition, FeatureType};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn description() -> FeatureGroupDescription {
        FeatureGroupDescription::new(
            "titanic",
            "PassengerId",
            "EventTime",
            vec![
                FeatureDefinition::new("PassengerId", FeatureType::Integral),
                FeatureDefinition::new("fare", FeatureType::Fractional),
                FeatureDefinition::new("EventTime", FeatureType::String),
            ],
            "ignored",
        )
    }

    fn batch(rows: Vec<Vec<Value>>) -> DataBatch {
        DataBatch::new(
            vec!["PassengerId".into(), "fare".into(), "EventTime".into()],
            rows,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        store.create_group(description()).await.unwrap();
        assert!(dir.path().join("eu-west-1").join("registry.json").exists());

        let desc = store.describe("titanic").await.unwrap();
        assert_eq!(desc.region, "eu-west-1");
        assert_eq!(store.list_groups().await.unwrap().len(), 1);
        assert!(matches!(
            store.create_group(description()).await,
            Err(PipelineError::AlreadyExists(_))
        ));

        store.delete_group("titanic").await.unwrap();
        assert!(matches!(
            store.describe("titanic").await,
            Err(PipelineError::NotFound(_))
        ));
        assert!(store.delete_group("titanic").await.is_err());
    }

    #[tokio::test]
    async fn test_create_requires_identifier_feature() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        let mut desc = description();
        desc.record_identifier_feature_name = "id".into();
        assert!(matches!(
            store.create_group(desc).await,
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_and_get_record() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        store.create_group(description()).await.unwrap();

        let rows = (1..=10)
            .map(|i| vec![json!(i), json!(i as f64 * 1.5), json!("2024-01-01T00:00:00Z")])
            .collect();
        let options = IngestOptions {
            max_workers: 3,
            max_processes: 2,
        };
        let report = store.ingest("titanic", &batch(rows), options).await.unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.ingested, 10);
        assert!(report.failed_rows.is_empty());

        let record = store.get_record("titanic", "4").await.unwrap().unwrap();
        assert_eq!(record.get("fare"), Some(&json!(6.0)));
        assert!(store.get_record("titanic", "99").await.unwrap().is_none());
        assert!(store.get_record("other", "4").await.is_err());
    }

    #[tokio::test]
    async fn test_ingest_reports_failed_rows() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        store.create_group(description()).await.unwrap();

        let rows = vec![
            vec![json!(1), json!(7.25), json!("2024-01-01T00:00:00Z")],
            vec![Value::Null, json!(7.25), json!("2024-01-01T00:00:00Z")],
            vec![json!(3), json!(7.25), Value::Null],
        ];
        let report = store
            .ingest("titanic", &batch(rows), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed_rows, vec![1, 2]);
        assert_eq!(report.ingested, 1);
    }

    #[tokio::test]
    async fn test_unknown_feature_fails_row() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        store.create_group(description()).await.unwrap();

        let batch = DataBatch::new(
            vec!["PassengerId".into(), "EventTime".into(), "cabin".into()],
            vec![vec![json!(1), json!("2024-01-01T00:00:00Z"), json!("C85")]],
        )
        .unwrap();
        let report = store
            .ingest("titanic", &batch, IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed_rows, vec![0]);
    }

    #[tokio::test]
    async fn test_newest_event_time_wins() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        store.create_group(description()).await.unwrap();

        let newer = batch(vec![vec![json!(1), json!(2.0), json!("2024-06-01T00:00:00Z")]]);
        let older = batch(vec![vec![json!(1), json!(1.0), json!("2024-01-01T00:00:00Z")]]);
        store
            .ingest("titanic", &newer, IngestOptions::default())
            .await
            .unwrap();
        store
            .ingest("titanic", &older, IngestOptions::default())
            .await
            .unwrap();

        let record = store.get_record("titanic", "1").await.unwrap().unwrap();
        assert_eq!(record.get("fare"), Some(&json!(2.0)));
    }

    #[tokio::test]
    async fn test_distinct_ids_get_distinct_records() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path(), "eu-west-1");
        let mut desc = description();
        desc.feature_definitions[0] = FeatureDefinition::new("PassengerId", FeatureType::String);
        store.create_group(desc).await.unwrap();

        let ids = ["a/b", "a_b", "a%2Fb", "..", "A"];
        let rows = ids
            .iter()
            .enumerate()
            .map(|(i, id)| vec![json!(id), json!(i as f64), json!("2024-01-01T00:00:00Z")])
            .collect();
        let report = store
            .ingest("titanic", &batch(rows), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.ingested, ids.len());

        for (i, id) in ids.iter().enumerate() {
            let record = store.get_record("titanic", id).await.unwrap().unwrap();
            assert_eq!(record.get("PassengerId"), Some(&json!(id)));
            assert_eq!(record.get("fare"), Some(&json!(i as f64)));
        }
        let files = std::fs::read_dir(dir.path().join("eu-west-1").join("titanic"))
            .unwrap()
            .count();
        assert_eq!(files, ids.len());
    }

    #[tokio::test]
    async fn test_group_names_stay_inside_the_store() {
        let dir = TempDir::new().unwrap();
        let store = LocalFeatureStore::new(dir.path().join("store"), "eu-west-1");
        for name in ["../x", "a/b", "", ".."] {
            let mut desc = description();
            desc.name = name.to_string();
            assert!(
                matches!(store.create_group(desc).await, Err(PipelineError::InvalidInput(_))),
                "{name:?} accepted"
            );
        }
        assert!(matches!(
            store.get_record("../x", "1").await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(!dir.path().join("x").exists());
    }

    #[test]
    fn test_record_key_treats_integral_floats_as_integers() {
        assert_eq!(record_key(&json!(1)), "1");
        assert_eq!(record_key(&json!(1.0)), "1");
        assert_eq!(record_key(&json!(1.5)), "1.5");
        assert_eq!(record_key(&json!("007")), "007");
    }

    #[test]
    fn test_compare_event_times() {
        assert_eq!(
            compare_event_times(&json!("2024-01-02T00:00:00Z"), &json!("2024-01-01T00:00:00Z")),
            Ordering::Greater
        );
        assert_eq!(compare_event_times(&json!(10), &json!(10.0)), Ordering::Equal);
    }
}
