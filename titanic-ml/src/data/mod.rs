//! Tabular data handling: CSV I/O, schemas, transforms, validation and lineage.

pub mod hypothesis;
pub mod lineage;
pub mod schema;
pub mod source;
pub mod transform;
pub mod validate;

pub use hypothesis::{Relationship, TTestOutcome, ttest_ind};
pub use lineage::DataLineage;
pub use schema::{ColumnSchema, ColumnType, SchemaDefinition};
pub use source::{CsvSource, DataBatch, DataSource, parse_csv, write_csv};
pub use transform::{TransformPipeline, TransformRecord, TransformStep};
pub use validate::{Check, ColumnRule, Hypothesis, ValidationReport, ValidationSchema};
