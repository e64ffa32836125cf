//! vpm core - data model, config store and error types for the vroomy
//! package manager.

pub mod config;
mod error;
mod plugin;
mod report;
mod status;

pub use config::{Config, Settings};
pub use error::{Result, StageError, VpmError};
pub use plugin::{PluginSpec, Source};
pub use report::{Operation, OperationReport, PluginOutcome};
pub use status::{BuildStatus, PipelineState, ResolvedPlugin, TestResult, TestStatus};
