//! Feature validation against the processed-data schema.

use crate::data::hypothesis::Relationship;
use crate::data::schema::ColumnType;
use crate::data::source::DataBatch;
use crate::data::validate::{Check, ColumnRule, Hypothesis, ValidationReport, ValidationSchema};
use crate::error::{PipelineError, Result};
use crate::steps::PipelineStep;
use crate::steps::processing::{AGE_LABELS, HOURS_TRAVELING};
use async_trait::async_trait;
use titanic_core::ValidationConfig;
use tracing::{info, warn};

/// Schema of the engineered Titanic features.
pub fn titanic_schema(config: &ValidationConfig) -> ValidationSchema {
    let mut target = ColumnRule::new("target", ColumnType::Integer).check(Check::isin([0, 1]));
    if config.hypothesis {
        target = target.hypothesis(Hypothesis::two_sample_ttest(
            "sex",
            "female",
            "male",
            Relationship::GreaterThan,
            config.alpha,
        ));
    }

    ValidationSchema::new()
        .column(target)
        .column(ColumnRule::new("sex", ColumnType::String).check(Check::isin(["male", "female"])))
        .column(ColumnRule::new("pclass", ColumnType::Integer).check(Check::isin([1, 2, 3])))
        .column(ColumnRule::new("sibsp", ColumnType::Integer).check(Check::GreaterOrEqual { min: 0.0 }))
        .column(ColumnRule::new("parch", ColumnType::Integer).check(Check::GreaterOrEqual { min: 0.0 }))
        .column(
            ColumnRule::new("fare", ColumnType::Float)
                .nullable()
                .check(Check::GreaterOrEqual { min: 0.0 }),
        )
        .column(
            ColumnRule::new("embarked", ColumnType::String)
                .nullable()
                .check(Check::isin(HOURS_TRAVELING.iter().map(|(port, _)| *port))),
        )
        .column(
            ColumnRule::new("hours_traveling", ColumnType::Float)
                .nullable()
                .check(Check::isin(HOURS_TRAVELING.iter().map(|(_, hours)| *hours))),
        )
        .column(
            ColumnRule::new("age_group", ColumnType::String)
                .nullable()
                .check(Check::isin(AGE_LABELS.iter().copied())),
        )
        .column(ColumnRule::new("alone", ColumnType::String).check(Check::isin(["yes", "no"])))
}

/// Validate engineered features; the batch passes through unchanged.
#[derive(Debug, Clone)]
pub struct ValidationStep {
    schema: ValidationSchema,
}

impl ValidationStep {
    pub fn new(schema: ValidationSchema) -> Self {
        Self { schema }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(titanic_schema(config))
    }

    pub fn schema(&self) -> &ValidationSchema {
        &self.schema
    }

    /// Run the schema and return the report without failing.
    pub fn report(&self, batch: &DataBatch) -> ValidationReport {
        self.schema.validate(batch)
    }
}

#[async_trait]
impl PipelineStep for ValidationStep {
    fn name(&self) -> &'static str {
        "validate_features"
    }

    async fn process(&self, batch: DataBatch) -> Result<DataBatch> {
        let report = self.report(&batch);
        for hypothesis in &report.hypotheses {
            if let Some(outcome) = &hypothesis.outcome {
                info!(
                    column = %hypothesis.column,
                    statistic = outcome.statistic,
                    p_value = outcome.p_value,
                    passed = hypothesis.passed,
                    "Hypothesis test"
                );
            }
        }
        if report.duplicate_rows > 0 {
            warn!(duplicates = report.duplicate_rows, "Duplicate feature rows");
        }
        if !report.passed {
            return Err(PipelineError::validation(report.failure_summary()));
        }
        info!(rows = report.total_rows, "Features validated");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn features() -> DataBatch {
        let columns = [
            "PassengerId",
            "target",
            "pclass",
            "sex",
            "sibsp",
            "parch",
            "fare",
            "embarked",
            "hours_traveling",
            "age_group",
            "alone",
        ];
        let mut rows = Vec::new();
        for i in 0..12 {
            let female = i % 2 == 0;
            // Women survive except one, men die except one.
            let survived = if female { i != 10 } else { i == 11 };
            rows.push(vec![
                json!(i + 1),
                json!(i32::from(survived)),
                json!(i % 3 + 1),
                json!(if female { "female" } else { "male" }),
                json!(0),
                json!(0),
                json!(725.0),
                json!("S"),
                json!(108.0),
                json!("young"),
                json!("yes"),
            ]);
        }
        DataBatch::new(columns.iter().map(|c| c.to_string()).collect(), rows)
            .unwrap()
            .with_index("PassengerId")
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_features_pass_through() {
        let step = ValidationStep::from_config(&ValidationConfig::default());
        let batch = features();
        let out = step.process(batch.clone()).await.unwrap();
        assert_eq!(out, batch);
    }

    #[tokio::test]
    async fn test_invalid_features_fail_with_all_failures() {
        let mut batch = features();
        batch.rows[0][3] = json!("unknown");
        batch.rows[1][10] = json!("maybe");
        batch.rows[2][6] = json!(-1.0);
        let step = ValidationStep::from_config(&ValidationConfig::default());
        let err = step.process(batch).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Validation failed:"));
        assert!(msg.contains("'sex'"));
        assert!(msg.contains("'alone'"));
        assert!(msg.contains("'fare'"));
    }

    #[tokio::test]
    async fn test_nullable_columns_accept_nulls() {
        let mut batch = features();
        for col in [6, 7, 8, 9] {
            batch.rows[0][col] = Value::Null;
        }
        let step = ValidationStep::from_config(&ValidationConfig::default());
        assert!(step.process(batch).await.is_ok());
    }

    #[test]
    fn test_hypothesis_can_be_disabled() {
        let config = ValidationConfig {
            hypothesis: false,
            ..ValidationConfig::default()
        };
        let schema = titanic_schema(&config);
        assert!(schema.columns.iter().all(|c| c.hypotheses.is_empty()));

        let mut batch = features();
        // Reverse survival so the hypothesis would fail.
        for row in &mut batch.rows {
            let survived = row[1].as_i64().unwrap_or(0);
            row[1] = json!(1 - survived);
        }
        assert!(ValidationStep::new(schema).report(&batch).passed);
        assert!(!ValidationStep::from_config(&ValidationConfig::default())
            .report(&batch)
            .passed);
    }
}
