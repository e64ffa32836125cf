//! Runtime state tracked per plugin.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::plugin::PluginSpec;

/// Where a plugin is within one orchestrator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Pending,
    Fetching,
    Building,
    Testing,
    Succeeded,
    Failed,
}

/// Last known build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildStatus {
    #[default]
    Unknown,
    Built,
    Failed,
    /// Recorded as built, but the artifact is gone or has changed since.
    Stale,
}

/// Last known test status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
    /// The suite could not be executed.
    Errored,
}

/// Outcome of running a plugin's test suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub passed: bool,
    pub exit_code: i32,
    pub output: String,
}

/// Runtime record for a declared plugin.
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub spec: Arc<PluginSpec>,

    /// Commit the working copy was synced to.
    pub resolved_ref: Option<String>,

    /// Set only after a successful build.
    pub artifact: Option<PathBuf>,

    pub build_status: BuildStatus,
    pub test_status: TestStatus,
    pub state: PipelineState,

    /// Message of the most recent stage failure.
    pub last_error: Option<String>,
}

impl ResolvedPlugin {
    pub fn new(spec: Arc<PluginSpec>) -> Self {
        Self {
            spec,
            resolved_ref: None,
            artifact: None,
            build_status: BuildStatus::Unknown,
            test_status: TestStatus::Unknown,
            state: PipelineState::Pending,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.spec.alias.as_deref()
    }

    /// Records a successful build.
    pub fn mark_built(&mut self, artifact: PathBuf) {
        self.artifact = Some(artifact);
        self.build_status = BuildStatus::Built;
    }

    /// Records a failed build. The artifact path is cleared so a stale
    /// artifact is never reported as usable.
    pub fn mark_build_failed(&mut self, message: impl Into<String>) {
        self.artifact = None;
        self.build_status = BuildStatus::Failed;
        self.fail(message);
    }

    /// Moves the pipeline to `Failed` with the given message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = PipelineState::Failed;
        self.last_error = Some(message.into());
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Building => "building",
            Self::Testing => "testing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "not built",
            Self::Built => "built",
            Self::Failed => "build failed",
            Self::Stale => "stale",
        };
        f.write_str(s)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "not tested",
            Self::Passed => "tests passed",
            Self::Failed => "tests failed",
            Self::Errored => "tests errored",
        };
        f.write_str(s)
    }
}
