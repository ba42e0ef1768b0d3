//! Pipeline definition and the local session that executes it.

pub mod definition;
pub mod session;

pub use definition::{PIPELINE_NAME, PipelineDefinition, StepDefinition, StepKind, StepType};
pub use session::{ExecutionStatus, LocalPipelineSession, PipelineExecution, StepExecution};
