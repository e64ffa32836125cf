//! Aggregated results of an orchestrator call.

use std::fmt;
use std::path::PathBuf;

use crate::error::StageError;
use crate::status::{PipelineState, TestResult};

/// The lifecycle operation that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Update,
    Build,
    Test,
}

/// Combined result of one operation across its target plugins.
#[derive(Debug, Clone)]
pub struct OperationReport {
    pub operation: Operation,

    /// One outcome per target, in declaration order.
    pub outcomes: Vec<PluginOutcome>,

    /// Total wall time in milliseconds.
    pub duration_ms: u64,
}

/// Result of one plugin's pipeline.
#[derive(Debug, Clone)]
pub struct PluginOutcome {
    pub name: String,
    pub alias: Option<String>,
    pub state: PipelineState,
    pub resolved_ref: Option<String>,
    pub artifact: Option<PathBuf>,
    pub test: Option<TestResult>,
    pub error: Option<StageError>,
}

impl OperationReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            outcomes: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Returns true if every target succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PluginOutcome::succeeded)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn outcome(&self, name: &str) -> Option<&PluginOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// One-line description of every failed plugin.
    pub fn failure_summary(&self) -> String {
        self.failed()
            .map(|o| format!("{} ({})", o.name, o.failure_reason()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl PluginOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Describes why the pipeline failed, or an empty string if it did not.
    pub fn failure_reason(&self) -> String {
        if let Some(err) = &self.error {
            return format!("{}: {}", err.kind(), err);
        }

        match &self.test {
            Some(result) if !result.passed => {
                format!("tests failed with exit code {}", result.exit_code)
            }
            _ => String::new(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Update => "update",
            Self::Build => "build",
            Self::Test => "test",
        };
        f.write_str(s)
    }
}
