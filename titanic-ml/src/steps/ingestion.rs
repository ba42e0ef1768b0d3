//! Feature-group ingestion step.

use crate::data::source::DataBatch;
use crate::error::{PipelineError, Result};
use crate::features::definition::{FeatureGroupDescription, load_feature_definitions};
use crate::features::ingest::{ingest_options, prepare_for_ingestion};
use crate::features::store::FeatureStore;
use crate::steps::PipelineStep;
use async_trait::async_trait;
use std::sync::Arc;
use titanic_core::FeatureStoreConfig;
use tracing::info;

/// Push validated features into a feature group.
pub struct IngestionStep {
    store: Arc<dyn FeatureStore>,
    group_name: String,
    rows_per_worker: usize,
    /// Identifier and event-time names used when the group has to be created.
    record_identifier_name: String,
    event_time_feature_name: String,
    create_if_missing: bool,
}

impl IngestionStep {
    pub fn new(store: Arc<dyn FeatureStore>, group_name: &str) -> Self {
        let defaults = FeatureStoreConfig::default();
        Self {
            store,
            group_name: group_name.to_string(),
            rows_per_worker: defaults.rows_per_worker,
            record_identifier_name: defaults.record_identifier_name,
            event_time_feature_name: defaults.event_time_feature_name,
            create_if_missing: false,
        }
    }

    pub fn from_config(store: Arc<dyn FeatureStore>, config: &FeatureStoreConfig) -> Self {
        Self {
            store,
            group_name: config.group_name.clone(),
            rows_per_worker: config.rows_per_worker,
            record_identifier_name: config.record_identifier_name.clone(),
            event_time_feature_name: config.event_time_feature_name.clone(),
            create_if_missing: false,
        }
    }

    pub fn with_group(mut self, group_name: &str) -> Self {
        self.group_name = group_name.to_string();
        self
    }

    /// Create the group from the batch columns when it does not exist yet.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    async fn resolve_group(&self, batch: DataBatch) -> Result<(FeatureGroupDescription, DataBatch)> {
        match self.store.describe(&self.group_name).await {
            Ok(description) => {
                let prepared = prepare_for_ingestion(
                    batch,
                    &description.record_identifier_feature_name,
                    &description.event_time_feature_name,
                )?;
                Ok((description, prepared))
            }
            Err(PipelineError::NotFound(_)) if self.create_if_missing => {
                let prepared = prepare_for_ingestion(
                    batch,
                    &self.record_identifier_name,
                    &self.event_time_feature_name,
                )?;
                let description = FeatureGroupDescription::new(
                    &self.group_name,
                    &self.record_identifier_name,
                    &self.event_time_feature_name,
                    load_feature_definitions(&prepared),
                    "",
                );
                self.store.create_group(description).await?;
                let description = self.store.describe(&self.group_name).await?;
                Ok((description, prepared))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PipelineStep for IngestionStep {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn process(&self, batch: DataBatch) -> Result<DataBatch> {
        let (description, prepared) = self.resolve_group(batch).await?;

        let options = ingest_options(prepared.row_count(), self.rows_per_worker);
        info!(
            group = %description.name,
            region = %description.region,
            max_workers = options.max_workers,
            max_processes = options.max_processes,
            "Ingesting features"
        );

        let report = self
            .store
            .ingest(&description.name, &prepared, options)
            .await?;
        if !report.failed_rows.is_empty() {
            return Err(PipelineError::Ingestion {
                rows: report.failed_rows,
            });
        }
        info!(group = %description.name, rows = report.ingested, "Ingestion finished");
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::store::LocalFeatureStore;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn validated() -> DataBatch {
        DataBatch::new(
            vec!["PassengerId".into(), "sex".into(), "fare".into()],
            vec![
                vec![json!(1), json!("male"), json!(725.0)],
                vec![json!(2), json!("female"), Value::Null],
            ],
        )
        .unwrap()
        .with_index("PassengerId")
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_group_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalFeatureStore::new(dir.path(), "eu-west-1"));
        let step = IngestionStep::new(store, "titanic");
        assert!(matches!(
            step.process(validated()).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_creates_group_and_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalFeatureStore::new(dir.path(), "eu-west-1"));
        let step = IngestionStep::new(store.clone(), "titanic").create_if_missing(true);

        let out = step.process(validated()).await.unwrap();
        assert!(out.has_column("EventTime"));

        let description = store.describe("titanic").await.unwrap();
        assert_eq!(description.record_identifier_feature_name, "PassengerId");
        assert_eq!(description.feature_definitions.len(), 4);

        let record = store.get_record("titanic", "2").await.unwrap().unwrap();
        assert_eq!(record.get("sex"), Some(&json!("female")));
        assert_eq!(record.get("fare"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_ingest_reports_rows_outside_definitions() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalFeatureStore::new(dir.path(), "eu-west-1"));
        let step = IngestionStep::new(store.clone(), "titanic").create_if_missing(true);
        step.process(validated()).await.unwrap();

        let mut extra = validated();
        extra.set_column("alone", vec![json!("yes"), json!("no")]).unwrap();
        let err = step.process(extra).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion { ref rows } if rows == &vec![0, 1]));
    }
}
