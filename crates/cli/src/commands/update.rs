//! Update command implementation.

use miette::Result;
use vpm_engine::Orchestrator;

use crate::output;

/// Fetches and builds the selected plugins.
pub async fn execute(
    orchestrator: &Orchestrator,
    branch: Option<&str>,
    plugins: &[String],
) -> Result<()> {
    output::info(&output::selection_message("Updating", plugins));
    if let Some(branch) = branch {
        output::info(&format!("Using branch: {}", branch));
    }

    let spinner = output::create_spinner("Fetching and building");
    let result = orchestrator.update_plugins(branch, plugins).await;
    spinner.finish_and_clear();

    super::finish(result)?;
    output::success("Update complete!");
    Ok(())
}
