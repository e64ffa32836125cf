//! Runs plugin test suites.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use vpm_core::{PluginSpec, Settings, StageError, TestResult};

use crate::runner::ProcessRunner;

/// Runs `go test ./...` in a working copy.
pub struct TestRunner {
    runner: Arc<dyn ProcessRunner>,
    settings: Arc<Settings>,
}

impl TestRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: Arc<Settings>) -> Self {
        Self { runner, settings }
    }

    /// Runs the suite.
    ///
    /// A failing suite is a normal result with `passed == false`. Only an
    /// inability to execute the suite at all is an error.
    pub async fn test(
        &self,
        spec: &PluginSpec,
        working_copy: &Path,
    ) -> Result<TestResult, StageError> {
        if !working_copy.is_dir() {
            return Err(StageError::test(format!(
                "working copy {} does not exist, run `vpm update {}` first",
                working_copy.display(),
                spec.name
            )));
        }

        let go = &self.settings.go;
        let args = vec!["test".to_string(), "./...".to_string()];

        debug!(plugin = %spec.name, "testing");
        let output = self
            .runner
            .run(go, &args, working_copy)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StageError::test(format!("'{}' not found", go)),
                _ => StageError::test(format!("cannot run {} test: {}", go, e)),
            })?;

        let result = TestResult {
            passed: output.success(),
            exit_code: output.exit_code,
            output: output.combined(),
        };

        info!(plugin = %spec.name, passed = result.passed, "tested");
        Ok(result)
    }
}
