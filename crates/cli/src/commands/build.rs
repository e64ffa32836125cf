//! Build command implementation.

use miette::Result;
use vpm_engine::Orchestrator;

use crate::output;

/// Builds the selected plugins from their current working copies.
pub async fn execute(orchestrator: &Orchestrator, plugins: &[String]) -> Result<()> {
    output::info(&output::selection_message("Building", plugins));

    let spinner = output::create_spinner("Building");
    let result = orchestrator.build_plugins(plugins).await;
    spinner.finish_and_clear();

    super::finish(result)?;
    output::success("Build complete!");
    Ok(())
}
