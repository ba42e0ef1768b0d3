//! Column types, schema inference and value casting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    DateTime,
    Json,
    Null,
    Unknown,
}

impl ColumnType {
    /// Type of a single cell.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Integer,
            Value::String(_) => Self::String,
            Value::Array(_) | Value::Object(_) => Self::Json,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Null => "null",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Schema definition for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

/// Infer column type from a sample of values.
///
/// Any string makes the column a string column; otherwise floats win over integers.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen_any = false;
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;
    let mut has_json = false;

    for v in values {
        match ColumnType::of(v) {
            ColumnType::Null => continue,
            ColumnType::Integer => has_int = true,
            ColumnType::Float => has_float = true,
            ColumnType::Boolean => has_bool = true,
            ColumnType::String => has_string = true,
            _ => has_json = true,
        }
        seen_any = true;
    }

    if !seen_any {
        return ColumnType::Null;
    }
    if has_string {
        return ColumnType::String;
    }
    if has_json {
        return ColumnType::Json;
    }
    if has_float {
        return ColumnType::Float;
    }
    if has_int {
        return ColumnType::Integer;
    }
    if has_bool {
        return ColumnType::Boolean;
    }
    ColumnType::Unknown
}

/// Infer schema from column names and rows.
pub fn infer_schema(columns: &[String], rows: &[Vec<Value>]) -> SchemaDefinition {
    let columns = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = rows.iter().filter_map(|row| row.get(i));
            let dtype = infer_column_type(values);
            let nullable = rows.iter().any(|row| row.get(i).is_none_or(Value::is_null));
            ColumnSchema {
                name: name.clone(),
                dtype,
                nullable,
            }
        })
        .collect();

    SchemaDefinition { columns }
}

/// Cast one cell to `target`. `Null` always stays `Null`; `None` means the cast failed.
pub fn cast_value(value: &Value, target: ColumnType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        ColumnType::Integer => match value {
            Value::Number(n) => n.as_i64().map(Value::from).or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| Value::from(f as i64))
            }),
            Value::Bool(b) => Some(Value::from(i64::from(*b))),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        ColumnType::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            serde_json::Number::from_f64(f).map(Value::Number)
        }
        ColumnType::String => Some(Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::Number(n) => n.as_i64().filter(|i| *i == 0 || *i == 1).map(|i| Value::Bool(i == 1)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ColumnType::Null => None,
        ColumnType::DateTime | ColumnType::Json | ColumnType::Unknown => Some(value.clone()),
    }
}

/// Numeric view of a cell, if it has one.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
