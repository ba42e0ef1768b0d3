//! Schema validation: column presence, types, value checks and hypothesis tests.
//!
//! Validation is lazy: every rule runs and all failures land in one
//! [`ValidationReport`] instead of stopping at the first problem.

use crate::data::hypothesis::{Relationship, TTestOutcome, ttest_ind};
use crate::data::schema::{ColumnType, as_f64};
use crate::data::source::DataBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Failure examples kept per check before the rest are only counted.
const MAX_EXAMPLES: usize = 5;

/// A value-level check on a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    IsIn { values: Vec<Value> },
    GreaterOrEqual { min: f64 },
}

impl Check {
    pub fn isin<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::IsIn {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn holds(&self, value: &Value) -> bool {
        match self {
            Self::IsIn { values } => values.iter().any(|v| match (as_f64(v), as_f64(value)) {
                (Some(a), Some(b)) => a == b,
                _ => v == value,
            }),
            Self::GreaterOrEqual { min } => as_f64(value).is_some_and(|x| x >= *min),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsIn { values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "isin({})", rendered.join(", "))
            }
            Self::GreaterOrEqual { min } => write!(f, "greater_than_or_equal_to({min})"),
        }
    }
}

/// Two-sample hypothesis on a numeric column split by a grouping column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub groupby: String,
    pub sample1: String,
    pub sample2: String,
    pub relationship: Relationship,
    pub alpha: f64,
    #[serde(default = "default_equal_var")]
    pub equal_var: bool,
}

fn default_equal_var() -> bool {
    true
}

impl Hypothesis {
    pub fn two_sample_ttest(
        groupby: &str,
        sample1: &str,
        sample2: &str,
        relationship: Relationship,
        alpha: f64,
    ) -> Self {
        Self {
            groupby: groupby.to_string(),
            sample1: sample1.to_string(),
            sample2: sample2.to_string(),
            relationship,
            alpha,
            equal_var: true,
        }
    }
}

/// Rules for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub name: String,
    pub dtype: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    /// A missing optional column is not a failure.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub checks: Vec<Check>,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
}

impl ColumnRule {
    pub fn new(name: &str, dtype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            nullable: false,
            optional: false,
            checks: Vec::new(),
            hypotheses: Vec::new(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn hypothesis(mut self, hypothesis: Hypothesis) -> Self {
        self.hypotheses.push(hypothesis);
        self
    }
}

/// A dataframe schema: a set of column rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSchema {
    pub columns: Vec<ColumnRule>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, rule: ColumnRule) -> Self {
        self.columns.push(rule);
        self
    }

    /// Run every rule against the batch.
    pub fn validate(&self, batch: &DataBatch) -> ValidationReport {
        let mut report = ValidationReport::summarize(batch);
        for rule in &self.columns {
            validate_column(rule, batch, &mut report);
        }
        report.passed = report.failures.is_empty();
        report
    }
}

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub column: String,
    pub check: String,
    /// Offending row positions (first few only).
    pub rows: Vec<usize>,
    /// Total number of offending rows.
    pub failure_count: usize,
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column '{}' failed {}: {}", self.column, self.check, self.message)
    }
}

/// Result of a hypothesis test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisResult {
    pub column: String,
    pub hypothesis: Hypothesis,
    pub outcome: Option<TTestOutcome>,
    pub passed: bool,
}

/// A data validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub null_percentage: BTreeMap<String, f64>,
    pub duplicate_rows: usize,
    pub failures: Vec<ValidationFailure>,
    pub hypotheses: Vec<HypothesisResult>,
    pub passed: bool,
}

impl ValidationReport {
    fn summarize(batch: &DataBatch) -> Self {
        let total_rows = batch.row_count();
        let mut null_percentage = BTreeMap::new();
        for (i, col) in batch.columns.iter().enumerate() {
            let nulls = batch.rows.iter().filter(|row| row[i].is_null()).count();
            let pct = if total_rows > 0 {
                nulls as f64 / total_rows as f64 * 100.0
            } else {
                0.0
            };
            null_percentage.insert(col.clone(), pct);
        }

        // Duplicates ignore the index: two passengers with identical features count.
        let index_pos = batch.index.as_deref().and_then(|i| batch.column_index(i));
        let mut seen = HashSet::new();
        let mut duplicate_rows = 0;
        for row in &batch.rows {
            let key: Vec<&Value> = row
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != index_pos)
                .map(|(_, v)| v)
                .collect();
            if !seen.insert(serde_json::to_string(&key).unwrap_or_default()) {
                duplicate_rows += 1;
            }
        }

        Self {
            total_rows,
            total_columns: batch.column_count(),
            null_percentage,
            duplicate_rows,
            failures: Vec::new(),
            hypotheses: Vec::new(),
            passed: true,
        }
    }

    /// One line per failure, for error messages.
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn push_failure(
    report: &mut ValidationReport,
    column: &str,
    check: impl Into<String>,
    rows: Vec<usize>,
    message: impl Into<String>,
) {
    let failure_count = rows.len();
    report.failures.push(ValidationFailure {
        column: column.to_string(),
        check: check.into(),
        rows: rows.into_iter().take(MAX_EXAMPLES).collect(),
        failure_count,
        message: message.into(),
    });
}

fn dtype_matches(expected: ColumnType, value: &Value) -> bool {
    let actual = ColumnType::of(value);
    match expected {
        // Integers are valid floats.
        ColumnType::Float => actual.is_numeric(),
        ColumnType::Unknown => true,
        other => actual == other,
    }
}

fn validate_column(rule: &ColumnRule, batch: &DataBatch, report: &mut ValidationReport) {
    let Ok(values) = batch.column_values(&rule.name) else {
        if !rule.optional {
            push_failure(
                report,
                &rule.name,
                "column_in_dataframe",
                Vec::new(),
                "column not in dataframe",
            );
        }
        return;
    };

    let null_rows: Vec<usize> = positions(&values, Value::is_null);
    if !rule.nullable && !null_rows.is_empty() {
        let n = null_rows.len();
        push_failure(
            report,
            &rule.name,
            "not_nullable",
            null_rows,
            format!("{n} null value(s) in non-nullable column"),
        );
    }

    let type_rows = positions(&values, |v| !v.is_null() && !dtype_matches(rule.dtype, v));
    if !type_rows.is_empty() {
        let n = type_rows.len();
        push_failure(
            report,
            &rule.name,
            format!("dtype('{}')", rule.dtype),
            type_rows,
            format!("{n} value(s) are not {}", rule.dtype),
        );
    }

    for check in &rule.checks {
        let bad = positions(&values, |v| !v.is_null() && !check.holds(v));
        if !bad.is_empty() {
            let examples: Vec<String> = bad
                .iter()
                .take(MAX_EXAMPLES)
                .map(|&i| values[i].to_string())
                .collect();
            let n = bad.len();
            push_failure(
                report,
                &rule.name,
                check.to_string(),
                bad,
                format!("{n} failure case(s), e.g. {}", examples.join(", ")),
            );
        }
    }

    for hypothesis in &rule.hypotheses {
        run_hypothesis(rule, hypothesis, batch, &values, report);
    }
}

fn positions<F>(values: &[&Value], mut predicate: F) -> Vec<usize>
where
    F: FnMut(&Value) -> bool,
{
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| predicate(v))
        .map(|(i, _)| i)
        .collect()
}

fn run_hypothesis(
    rule: &ColumnRule,
    hypothesis: &Hypothesis,
    batch: &DataBatch,
    values: &[&Value],
    report: &mut ValidationReport,
) {
    let check_name = format!(
        "two_sample_ttest({} {:?} {} by {})",
        hypothesis.sample1, hypothesis.relationship, hypothesis.sample2, hypothesis.groupby
    );

    let Ok(groups) = batch.column_values(&hypothesis.groupby) else {
        push_failure(
            report,
            &rule.name,
            check_name,
            Vec::new(),
            format!("groupby column '{}' not in dataframe", hypothesis.groupby),
        );
        report.hypotheses.push(HypothesisResult {
            column: rule.name.clone(),
            hypothesis: hypothesis.clone(),
            outcome: None,
            passed: false,
        });
        return;
    };

    let sample = |label: &str| -> Vec<f64> {
        groups
            .iter()
            .zip(values)
            .filter(|(g, _)| g.as_str() == Some(label))
            .filter_map(|(_, v)| as_f64(v))
            .collect()
    };
    let a = sample(&hypothesis.sample1);
    let b = sample(&hypothesis.sample2);

    let outcome = ttest_ind(&a, &b, hypothesis.equal_var);
    let passed = outcome.is_some_and(|o| o.supports(hypothesis.relationship, hypothesis.alpha));
    if !passed {
        let message = match &outcome {
            None => format!(
                "need at least two observations per group, got {} and {}",
                a.len(),
                b.len()
            ),
            Some(o) => format!(
                "t = {:.4}, p = {:.6}, alpha = {}",
                o.statistic, o.p_value, hypothesis.alpha
            ),
        };
        push_failure(report, &rule.name, check_name, Vec::new(), message);
    }
    report.hypotheses.push(HypothesisResult {
        column: rule.name.clone(),
        hypothesis: hypothesis.clone(),
        outcome,
        passed,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch() -> DataBatch {
        DataBatch::new(
            vec!["PassengerId".into(), "target".into(), "sex".into()],
            vec![
                vec![json!(1), json!(0), json!("male")],
                vec![json!(2), json!(1), json!("female")],
                vec![json!(3), json!(1), json!("female")],
                vec![json!(4), json!(1), json!("female")],
                vec![json!(5), json!(0), json!("male")],
                vec![json!(6), json!(0), json!("male")],
            ],
        )
        .unwrap()
        .with_index("PassengerId")
        .unwrap()
    }

    fn schema() -> ValidationSchema {
        ValidationSchema::new()
            .column(
                ColumnRule::new("target", ColumnType::Integer)
                    .check(Check::isin([0, 1]))
                    .hypothesis(Hypothesis::two_sample_ttest(
                        "sex",
                        "female",
                        "male",
                        Relationship::GreaterThan,
                        0.05,
                    )),
            )
            .column(ColumnRule::new("sex", ColumnType::String).check(Check::isin(["male", "female"])))
    }

    #[test]
    fn test_valid_batch_passes() {
        let report = schema().validate(&batch());
        assert!(report.passed, "{}", report.failure_summary());
        assert_eq!(report.hypotheses.len(), 1);
        assert!(report.hypotheses[0].passed);
        assert_eq!(report.total_rows, 6);
    }

    #[test]
    fn test_isin_failure_collects_rows() {
        let mut b = batch();
        b.rows[1][1] = json!(2);
        b.rows[4][2] = json!("unknown");
        let report = schema().validate(&b);
        assert!(!report.passed);
        let checks: Vec<&str> = report.failures.iter().map(|f| f.column.as_str()).collect();
        assert!(checks.contains(&"target"));
        assert!(checks.contains(&"sex"));
        let sex_failure = report.failures.iter().find(|f| f.column == "sex").unwrap();
        assert_eq!(sex_failure.rows, vec![4]);
        assert!(sex_failure.check.starts_with("isin("));
    }

    #[test]
    fn test_reversed_hypothesis_fails() {
        let schema = ValidationSchema::new().column(
            ColumnRule::new("target", ColumnType::Integer).hypothesis(
                Hypothesis::two_sample_ttest("sex", "male", "female", Relationship::GreaterThan, 0.05),
            ),
        );
        let report = schema.validate(&batch());
        assert!(!report.passed);
        assert!(report.failure_summary().contains("two_sample_ttest"));
    }

    #[test]
    fn test_missing_column_and_nulls() {
        let mut b = batch();
        b.rows[0][2] = Value::Null;
        let schema = schema().column(ColumnRule::new("alone", ColumnType::String));
        let report = schema.validate(&b);
        assert!(report.failures.iter().any(|f| f.check == "column_in_dataframe"));
        assert!(report.failures.iter().any(|f| f.check == "not_nullable"));
    }

    #[test]
    fn test_optional_column_may_be_missing() {
        let schema = ValidationSchema::new()
            .column(ColumnRule::new("embarked", ColumnType::String).optional());
        assert!(schema.validate(&batch()).passed);
    }

    #[test]
    fn test_dtype_mismatch() {
        let mut b = batch();
        b.rows[2][1] = json!("1");
        let report = schema().validate(&b);
        assert!(report.failures.iter().any(|f| f.check == "dtype('integer')"));
    }

    #[test]
    fn test_float_accepts_integers_and_range() {
        let b = DataBatch::new(
            vec!["fare".into()],
            vec![vec![json!(7)], vec![json!(7.25)], vec![json!(-1.0)]],
        )
        .unwrap();
        let schema = ValidationSchema::new().column(
            ColumnRule::new("fare", ColumnType::Float).check(Check::GreaterOrEqual { min: 0.0 }),
        );
        let report = schema.validate(&b);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].rows, vec![2]);
    }

    #[test]
    fn test_duplicates_ignore_index() {
        let b = DataBatch::new(
            vec!["PassengerId".into(), "sex".into()],
            vec![vec![json!(1), json!("male")], vec![json!(2), json!("male")]],
        )
        .unwrap()
        .with_index("PassengerId")
        .unwrap();
        let report = ValidationSchema::new().validate(&b);
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.null_percentage.get("sex"), Some(&0.0));
    }
}
