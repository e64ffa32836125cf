//! CLI command implementations.

pub mod build;
pub mod list;
pub mod update;

use std::path::Path;

use miette::{Result, miette};
use tracing::debug;
use vpm_core::{Config, OperationReport, VpmError};
use vpm_engine::Orchestrator;

use crate::output;

/// Loads the config and creates the orchestrator for this invocation.
pub fn open(config_path: &Path, jobs: Option<usize>) -> Result<Orchestrator> {
    let config = Config::load(config_path).map_err(diagnostic)?;
    debug!(
        config = %config_path.display(),
        plugins = config.plugins.len(),
        plugins_dir = %config.settings.plugins_dir.display(),
        "loaded config"
    );

    let orchestrator = Orchestrator::new(config).map_err(diagnostic)?;

    Ok(match jobs {
        Some(jobs) => orchestrator.with_max_parallelism(jobs),
        None => orchestrator,
    })
}

/// Prints the outcome of a mutating operation.
///
/// Returns the report when every plugin succeeded.
pub fn finish(result: vpm_core::Result<OperationReport>) -> Result<OperationReport> {
    match result {
        Ok(report) => {
            output::outcomes(&report);
            output::summary(&report);
            Ok(report)
        }
        Err(VpmError::PluginsFailed(report)) => {
            output::outcomes(&report);
            output::summary(&report);
            Err(miette!(
                "{} of {} plugin(s) failed",
                report.failed().count(),
                report.outcomes.len()
            ))
        }
        Err(e) => Err(diagnostic(e)),
    }
}

/// Converts an engine error into a diagnostic.
pub fn diagnostic(error: VpmError) -> miette::Report {
    match error {
        VpmError::ConfigNotFound(_) | VpmError::FileRead { .. } | VpmError::Config { .. } => {
            miette!(help = "check the config file passed with --config", "{}", error)
        }
        VpmError::UnknownPlugins(_) => {
            miette!(help = "run `vpm list` to see declared plugins", "{}", error)
        }
        other => miette!("{}", other),
    }
}
