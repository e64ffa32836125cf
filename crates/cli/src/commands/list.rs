//! List command implementation.

use console::style;
use miette::Result;
use vpm_engine::Orchestrator;

use crate::output;

use super::diagnostic;

/// Lists the selected plugins with their last known state.
pub async fn execute(orchestrator: &Orchestrator, plugins: &[String]) -> Result<()> {
    let listed = orchestrator
        .list_plugins(plugins)
        .await
        .map_err(diagnostic)?;

    if listed.is_empty() {
        output::info("No plugins declared");
        return Ok(());
    }

    println!("{}", style("Plugins:").bold());
    println!();

    for plugin in &listed {
        output::plugin_row(plugin);
    }

    Ok(())
}
