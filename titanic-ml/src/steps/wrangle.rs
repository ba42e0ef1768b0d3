//! Wrangling: column-name cleanup, irrelevant-column drops and null normalization.

use crate::data::schema::ColumnType;
use crate::data::source::DataBatch;
use crate::data::transform::{TransformPipeline, TransformRecord, TransformStep};
use crate::error::Result;
use crate::steps::PipelineStep;
use async_trait::async_trait;

/// Columns with no use for the features.
pub const IRRELEVANT_COLUMNS: &[&str] = &["cabin", "ticket", "name"];

const INTEGER_COLUMNS: &[&str] = &["target", "pclass", "sibsp", "parch"];
const FLOAT_COLUMNS: &[&str] = &["age", "fare"];

/// The wrangling plan.
pub fn wrangle_plan() -> TransformPipeline {
    let mut plan = TransformPipeline::new().add_step(TransformStep::NormalizeColumnNames);
    for column in IRRELEVANT_COLUMNS {
        plan = plan.add_step(TransformStep::DropColumn {
            column: column.to_string(),
        });
    }
    plan = plan
        .add_step(TransformStep::NormalizeNulls { columns: None })
        .add_step(TransformStep::RenameColumn {
            from: "survived".into(),
            to: "target".into(),
        });

    let casts = INTEGER_COLUMNS
        .iter()
        .map(|c| (c, ColumnType::Integer))
        .chain(FLOAT_COLUMNS.iter().map(|c| (c, ColumnType::Float)));
    for (column, dtype) in casts {
        plan = plan.add_step(TransformStep::Cast {
            column: column.to_string(),
            dtype,
            optional: true,
        });
    }
    plan
}

/// Clean, select and format the raw data.
#[derive(Debug, Clone)]
pub struct WrangleStep {
    plan: TransformPipeline,
}

impl WrangleStep {
    pub fn new() -> Self {
        Self {
            plan: wrangle_plan(),
        }
    }
}

impl Default for WrangleStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for WrangleStep {
    fn name(&self) -> &'static str {
        "wrangle"
    }

    async fn process(&self, batch: DataBatch) -> Result<DataBatch> {
        self.plan.apply(batch)
    }

    async fn process_recorded(&self, batch: DataBatch) -> Result<(DataBatch, Vec<TransformRecord>)> {
        self.plan.apply_recorded(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn raw() -> DataBatch {
        DataBatch::new(
            vec!["Cabin".into(), "Ticket".into(), "Name".into(), " AgE ".into()],
            vec![
                vec![json!("C123"), json!("ABC"), json!("John"), json!(20)],
                vec![json!("C456"), json!("DEF"), json!("Alice"), json!("nan")],
                vec![Value::Null, Value::Null, json!("Bob"), Value::Null],
                vec![Value::Null, Value::Null, Value::Null, json!(" ")],
                vec![Value::Null, Value::Null, Value::Null, Value::Null],
                vec![Value::Null, Value::Null, Value::Null, json!("NaN")],
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_columns_format() {
        let result = WrangleStep::new().process(raw()).await.unwrap();
        assert_eq!(result.columns, vec!["age"]);
    }

    #[tokio::test]
    async fn test_empty_values_become_null() {
        let result = WrangleStep::new().process(raw()).await.unwrap();
        let ages = result.column_values("age").unwrap();
        assert_eq!(ages.iter().filter(|v| v.is_null()).count(), 5);
        assert_eq!(ages[0], &json!(20.0));
    }

    #[tokio::test]
    async fn test_missing_irrelevant_column_fails() {
        let batch = DataBatch::new(vec!["Name".into()], vec![vec![json!("John")]]).unwrap();
        assert!(WrangleStep::new().process(batch).await.is_err());
    }

    #[tokio::test]
    async fn test_uncastable_value_names_column_and_row() {
        let batch = DataBatch::new(
            vec!["Name".into(), "Ticket".into(), "Cabin".into(), "Pclass".into()],
            vec![
                vec![json!("Braund"), json!("A/5"), Value::Null, json!(3)],
                vec![json!("Cumings"), json!("PC 17599"), json!("C85"), json!("first")],
            ],
        )
        .unwrap();

        let err = WrangleStep::new().process(batch).await.unwrap_err();
        assert!(matches!(err, PipelineError::Dataset(_)));
        assert_eq!(
            err.to_string(),
            "Dataset error: Column 'pclass' row 1: cannot cast \"first\" to integer"
        );
    }

    #[tokio::test]
    async fn test_survived_renamed_and_cast() {
        let batch = DataBatch::new(
            vec![
                "PassengerId".into(),
                "Survived".into(),
                "Pclass".into(),
                "Name".into(),
                "Ticket".into(),
                "Cabin".into(),
                "Fare".into(),
            ],
            vec![vec![
                json!(1),
                json!(0),
                json!(3),
                json!("Braund"),
                json!("A/5 21171"),
                Value::Null,
                json!(7),
            ]],
        )
        .unwrap()
        .with_index("PassengerId")
        .unwrap();

        let (result, records) = WrangleStep::new().process_recorded(batch).await.unwrap();
        assert_eq!(result.columns, vec!["PassengerId", "target", "pclass", "fare"]);
        assert_eq!(result.rows[0], vec![json!(1), json!(0), json!(3), json!(7.0)]);
        assert_eq!(records.len(), wrangle_plan().steps.len());
    }
}
