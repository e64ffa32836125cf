//! Error types for vpm.

use std::path::PathBuf;

use thiserror::Error;

use crate::report::OperationReport;

/// Result type alias for vpm operations.
pub type Result<T> = std::result::Result<T, VpmError>;

/// Main error type for vpm.
#[derive(Debug, Error)]
pub enum VpmError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("Duplicate plugin key '{key}' (declared by '{first}' and '{second}')")]
    DuplicatePlugin {
        key: String,
        first: String,
        second: String,
    },

    #[error("Unknown plugin(s): {}", .0.join(", "))]
    UnknownPlugins(Vec<String>),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{} of {} plugin(s) failed: {}", .0.failed().count(), .0.outcomes.len(), .0.failure_summary())]
    PluginsFailed(Box<OperationReport>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure confined to one plugin's pipeline.
///
/// Stage errors never abort sibling pipelines; the orchestrator records them
/// on the plugin's outcome and aggregates them into [`VpmError::PluginsFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Network, auth or ref resolution failure while syncing a working copy.
    #[error("{message}")]
    Fetch { message: String },

    /// Compile failure or missing toolchain.
    #[error("{message}")]
    Build {
        message: String,
        output: Option<String>,
    },

    /// The test suite could not be executed at all.
    #[error("{message}")]
    Test { message: String },
}

impl StageError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            output: None,
        }
    }

    pub fn build_with_output(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            output: Some(output.into()),
        }
    }

    pub fn test(message: impl Into<String>) -> Self {
        Self::Test {
            message: message.into(),
        }
    }

    /// Returns the error kind name shown to users.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "FetchError",
            Self::Build { .. } => "BuildError",
            Self::Test { .. } => "TestError",
        }
    }

    /// Returns captured tool output, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Build { output, .. } => output.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_plugins_lists_every_name() {
        let err = VpmError::UnknownPlugins(vec!["nonexistent".to_string(), "x".to_string()]);
        assert_eq!(err.to_string(), "Unknown plugin(s): nonexistent, x");
    }

    #[test]
    fn test_stage_error_kinds() {
        assert_eq!(StageError::fetch("x").kind(), "FetchError");
        assert_eq!(StageError::build("x").kind(), "BuildError");
        assert_eq!(StageError::test("x").kind(), "TestError");
        assert_eq!(
            StageError::build_with_output("exit 2", "undefined: foo").output(),
            Some("undefined: foo")
        );
    }
}
