//! # titanic-ml
//!
//! Feature engineering pipeline for the Titanic dataset:
//!
//! 1. **Wrangle**: normalize column names, drop irrelevant columns, normalize nulls
//! 2. **Process features**: travel hours, age groups, the alone flag, fare inflation
//! 3. **Validate**: schema checks plus a survival hypothesis test
//! 4. **Ingest**: push the features into a feature group
//!
//! Each step runs standalone over CSV files through [`steps::StepRunner`], or all
//! together through [`pipeline::LocalPipelineSession`].

pub mod data;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod steps;

pub use data::{DataBatch, DataLineage, TransformPipeline, ValidationReport, ValidationSchema};
pub use error::{PipelineError, Result};
pub use features::{FeatureStore, LocalFeatureStore};
pub use pipeline::{LocalPipelineSession, PipelineDefinition, PipelineExecution};
pub use steps::{PipelineStep, StepArgs, StepReport, StepRunner};
