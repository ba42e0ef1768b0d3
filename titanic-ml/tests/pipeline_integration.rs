//! End-to-end runs of the steps and the local pipeline over CSV files.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use titanic_core::PipelineConfig;
use titanic_ml::data::source::{CsvSource, DataSource};
use titanic_ml::features::{FeatureStore, LocalFeatureStore};
use titanic_ml::pipeline::{ExecutionStatus, LocalPipelineSession, PipelineDefinition};
use titanic_ml::steps::{ProcessingStep, StepArgs, StepRunner, WrangleStep};

const HEADER: &str = "PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked";

/// Twenty passengers: 8 of 10 women survive, 2 of 10 men survive.
fn titanic_csv() -> String {
    let ports = ["S", "C", "Q", "S", ""];
    let mut lines = vec![HEADER.to_string()];
    for i in 1..=20 {
        let female = i % 2 == 0;
        let survived = if female { i % 10 != 8 } else { i % 10 == 9 };
        let age = if i % 7 == 0 { String::new() } else { (i * 3).to_string() };
        let cabin = if i % 4 == 0 { "C85" } else { "" };
        lines.push(format!(
            "{i},{},{},\"Passenger, No. {i}\",{},{age},{},{},A/5 {i},{}.25,{cabin},{}",
            u8::from(survived),
            i % 3 + 1,
            if female { "female" } else { "male" },
            i % 2,
            i % 3 % 2,
            i + 6,
            ports[i % ports.len()],
        ));
    }
    lines.join("\n") + "\n"
}

fn setup(csv: &str) -> (TempDir, LocalPipelineSession, Arc<LocalFeatureStore>) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("titanic.csv"), csv).unwrap();
    let store = Arc::new(LocalFeatureStore::new(dir.path().join("store"), "eu-west-1"));
    let session = LocalPipelineSession::new(dir.path(), PipelineConfig::default(), store.clone())
        .create_missing_group(true);
    (dir, session, store)
}

async fn read(path: &Path) -> titanic_ml::DataBatch {
    CsvSource::new(path)
        .with_index("PassengerId")
        .load(None)
        .await
        .unwrap()
}

#[tokio::test]
async fn full_pipeline_ingests_every_passenger() {
    let (dir, session, store) = setup(&titanic_csv());
    let definition = PipelineDefinition::titanic(&PipelineConfig::default().data);

    let execution = session.start(&definition).await.unwrap();
    assert_eq!(
        execution.status,
        ExecutionStatus::Succeeded,
        "{:?}",
        execution.failure_reason
    );
    assert!(
        execution
            .list_steps()
            .iter()
            .all(|s| s.status == ExecutionStatus::Succeeded)
    );
    assert_eq!(execution.lineage.entries.len(), 4);
    assert!(execution.lineage.verify_integrity());

    for file in [
        "wrangled_data.csv",
        "processed_features.csv",
        "validated_features.csv",
    ] {
        assert!(dir.path().join(file).exists(), "{file} missing");
    }

    let wrangled = read(&dir.path().join("wrangled_data.csv")).await;
    assert_eq!(
        wrangled.columns,
        vec![
            "PassengerId",
            "target",
            "pclass",
            "sex",
            "age",
            "sibsp",
            "parch",
            "fare",
            "embarked"
        ]
    );

    let processed = read(&dir.path().join("processed_features.csv")).await;
    assert!(!processed.has_column("age"));
    assert!(processed.has_column("age_group"));

    let description = store.describe("titanic-features").await.unwrap();
    assert_eq!(description.region, "eu-west-1");
    let record = store
        .get_record("titanic-features", "1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.get("sex"), Some(&json!("male")));
    assert_eq!(record.get("hours_traveling"), Some(&json!(102.0)));
    assert_eq!(record.get("fare"), Some(&json!(725.0)));
    assert_eq!(record.get("alone"), Some(&json!("no")));
    assert!(record.get("EventTime").is_some_and(|t| t.is_string()));

    let listed = session.list_executions().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, execution.id);
}

#[tokio::test]
async fn validation_failure_stops_before_ingestion() {
    let csv = titanic_csv().replacen(",male,", ",unknown,", 1);
    let (dir, session, store) = setup(&csv);
    let definition = PipelineDefinition::titanic(&PipelineConfig::default().data);

    let execution = session.start(&definition).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let validation = execution.step("FeatureValidation").unwrap();
    assert_eq!(validation.status, ExecutionStatus::Failed);
    assert!(
        validation
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("'sex'"))
    );
    assert_eq!(
        execution.step("IngestFeatureGroup").unwrap().status,
        ExecutionStatus::NotStarted
    );
    assert!(dir.path().join("processed_features.csv").exists());
    assert!(!dir.path().join("validated_features.csv").exists());
    assert!(store.list_groups().await.unwrap().is_empty());
}

#[tokio::test]
async fn standalone_steps_hand_off_through_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("titanic.csv"), titanic_csv()).unwrap();
    let runner = StepRunner::new("PassengerId");

    let wrangle = StepArgs::new(dir.path(), "titanic.csv")
        .with_step_name("Data Wrangling")
        .with_output("wrangled_data.csv");
    let output = runner.run(&wrangle, &WrangleStep::new()).await.unwrap();
    assert_eq!(output.report.rows_in, 20);
    assert_eq!(output.report.columns_out, 9);

    let features = StepArgs::new(dir.path(), "wrangled_data.csv")
        .with_step_name("Feature Engineering")
        .with_output("processed_features.csv");
    let output = runner.run(&features, &ProcessingStep::new()).await.unwrap();
    assert_eq!(output.report.rows_out, 20);
    assert_eq!(output.transforms.len(), 5);

    let written = std::fs::read_to_string(dir.path().join("processed_features.csv")).unwrap();
    let header = written.lines().next().unwrap();
    assert!(header.starts_with("PassengerId,"));
    assert!(header.ends_with("hours_traveling,age_group,alone"));
}
