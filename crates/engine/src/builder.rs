//! Compiles working copies into loadable plugin artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use vpm_core::{PluginSpec, Settings, StageError};

use crate::runner::ProcessRunner;

/// Runs `go build -buildmode=plugin` for a plugin's entry point.
pub struct BuildRunner {
    runner: Arc<dyn ProcessRunner>,
    settings: Arc<Settings>,
}

impl BuildRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: Arc<Settings>) -> Self {
        Self { runner, settings }
    }

    /// Returns where the plugin's artifact is written.
    pub fn artifact_path(&self, spec: &PluginSpec) -> PathBuf {
        self.settings.artifact_path(&spec.name)
    }

    /// Builds the working copy and returns the artifact path.
    ///
    /// Any previous artifact is removed first, so after a failed build no
    /// artifact exists for the plugin. Failures are never retried here.
    pub async fn build(
        &self,
        spec: &PluginSpec,
        working_copy: &Path,
    ) -> Result<PathBuf, StageError> {
        let artifact = self.artifact_path(spec);
        prepare_artifact(&artifact).map_err(|e| {
            StageError::build(format!("cannot prepare {}: {}", artifact.display(), e))
        })?;

        if !working_copy.is_dir() {
            return Err(StageError::build(format!(
                "working copy {} does not exist, run `vpm update {}` first",
                working_copy.display(),
                spec.name
            )));
        }

        let args = vec![
            "build".to_string(),
            "-buildmode=plugin".to_string(),
            "-o".to_string(),
            artifact.to_string_lossy().to_string(),
            spec.entry.clone(),
        ];

        debug!(plugin = %spec.name, artifact = %artifact.display(), "building");
        let go = &self.settings.go;
        let output = self
            .runner
            .run(go, &args, working_copy)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    StageError::build(format!("toolchain '{}' not found", go))
                }
                _ => StageError::build(format!("cannot run {}: {}", go, e)),
            })?;

        if !output.success() {
            return Err(StageError::build_with_output(
                format!("{} build exited with code {}", go, output.exit_code),
                output.combined(),
            ));
        }

        if !artifact.is_file() {
            return Err(StageError::build(format!(
                "{} build succeeded but produced no artifact at {}",
                go,
                artifact.display()
            )));
        }

        info!(plugin = %spec.name, artifact = %artifact.display(), "built");
        Ok(artifact)
    }
}

/// Creates the artifact directory and removes any previous artifact.
fn prepare_artifact(artifact: &Path) -> io::Result<()> {
    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::remove_file(artifact) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;
    use tempfile::tempdir;
    use vpm_core::Source;

    fn setup(root: &Path) -> (Arc<Settings>, PluginSpec, PathBuf) {
        let settings = Arc::new(Settings {
            plugins_dir: root.join("plugins"),
            ..Settings::default()
        });
        let spec = PluginSpec::new("auth", Source::Remote("https://github.com/vroomy/auth".into()));
        let working_copy = settings.source_dir("auth");
        fs::create_dir_all(&working_copy).unwrap();
        (settings, spec, working_copy)
    }

    #[tokio::test]
    async fn test_build_writes_artifact() {
        let dir = tempdir().unwrap();
        let (settings, spec, working_copy) = setup(dir.path());
        let runner = Arc::new(FakeRunner::new());
        let builder = BuildRunner::new(runner.clone(), settings.clone());

        let artifact = builder.build(&spec, &working_copy).await.unwrap();

        assert_eq!(artifact, settings.artifact_path("auth"));
        assert!(artifact.is_file());

        let call = &runner.calls_for("auth", "go", "build")[0];
        assert_eq!(call.dir, working_copy);
        assert_eq!(call.args[1], "-buildmode=plugin");
        assert_eq!(call.args.last().map(String::as_str), Some("."));
    }

    #[tokio::test]
    async fn test_failed_build_removes_previous_artifact() {
        let dir = tempdir().unwrap();
        let (settings, spec, working_copy) = setup(dir.path());

        let artifact = settings.artifact_path("auth");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, "old").unwrap();

        let runner = Arc::new(FakeRunner::new().with_failing_build("auth"));
        let builder = BuildRunner::new(runner, settings);

        let err = builder.build(&spec, &working_copy).await.unwrap_err();

        assert_eq!(err.kind(), "BuildError");
        assert!(err.output().unwrap().contains("undefined: Handler"));
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_missing_toolchain() {
        let dir = tempdir().unwrap();
        let (settings, spec, working_copy) = setup(dir.path());
        let runner = Arc::new(FakeRunner::new().with_missing_program("go"));
        let builder = BuildRunner::new(runner, settings);

        let err = builder.build(&spec, &working_copy).await.unwrap_err();
        assert_eq!(err.to_string(), "toolchain 'go' not found");
    }

    #[tokio::test]
    async fn test_missing_working_copy_removes_previous_artifact() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(Settings {
            plugins_dir: dir.path().join("plugins"),
            ..Settings::default()
        });
        let spec = PluginSpec::new("cache", Source::Remote("u".into()));
        let runner = Arc::new(FakeRunner::new());
        let builder = BuildRunner::new(runner.clone(), settings.clone());

        let artifact = settings.artifact_path("cache");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, "old").unwrap();

        let err = builder
            .build(&spec, &settings.source_dir("cache"))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Build { .. }));
        assert!(runner.calls().is_empty());
        assert!(!artifact.exists());
    }
}
