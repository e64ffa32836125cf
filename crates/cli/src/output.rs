//! Terminal output formatting.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use vpm_core::{OperationReport, PluginOutcome, ResolvedPlugin};

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), message);
}

/// Creates a spinner for a running operation.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(template);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Describes which plugins an operation targets, e.g. "Updating all Plugins...".
pub fn selection_message(verb: &str, names: &[String]) -> String {
    if names.is_empty() {
        format!("{} all Plugins...", verb)
    } else {
        format!("{} Plugins matching: {}...", verb, names.join(", "))
    }
}

/// Displays a plugin name with its alias, if any.
fn display_name(name: &str, alias: Option<&str>) -> String {
    match alias {
        Some(alias) if alias != name => format!("{} ({})", name, alias),
        _ => name.to_string(),
    }
}

/// Abbreviates a commit hash; other refs are shown whole.
pub fn short_ref(resolved: &str) -> &str {
    let is_hash = resolved.len() == 40 && resolved.chars().all(|c| c.is_ascii_hexdigit());
    if is_hash { &resolved[..7] } else { resolved }
}

/// Prints one line per plugin, with captured tool output under failures.
pub fn outcomes(report: &OperationReport) {
    for outcome in &report.outcomes {
        if outcome.succeeded() {
            plugin_succeeded(outcome);
        } else {
            plugin_failed(outcome);
        }
    }
}

fn plugin_succeeded(outcome: &PluginOutcome) {
    let mut line = display_name(&outcome.name, outcome.alias.as_deref());

    if let Some(resolved) = &outcome.resolved_ref {
        line.push_str(&format!(" {}", style(short_ref(resolved)).dim()));
    }
    if let Some(artifact) = &outcome.artifact {
        line.push_str(&format!(" {}", style(format!("→ {}", artifact.display())).dim()));
    }
    if outcome.test.is_some() {
        line.push_str(&format!(" {}", style("tests passed").dim()));
    }

    println!("{} {}", style("✓").green(), line);
}

fn plugin_failed(outcome: &PluginOutcome) {
    eprintln!(
        "{} {} - {}",
        style("✗").red(),
        style(display_name(&outcome.name, outcome.alias.as_deref())).red(),
        outcome.failure_reason()
    );

    let captured = match (&outcome.error, &outcome.test) {
        (Some(error), _) => error.output(),
        (None, Some(test)) => Some(test.output.as_str()),
        (None, None) => None,
    };

    for line in captured.into_iter().flat_map(str::lines) {
        eprintln!("    {}", style(line).dim());
    }
}

/// Prints the totals of an operation.
pub fn summary(report: &OperationReport) {
    let succeeded = report.succeeded().count();
    let failed = report.failed().count();

    println!();

    if failed > 0 {
        println!(
            "{}: {} succeeded, {} failed in {}ms",
            style("FAILED").red().bold(),
            succeeded,
            failed,
            report.duration_ms
        );
    } else {
        println!(
            "{}: {} succeeded in {}ms",
            style("SUCCESS").green().bold(),
            succeeded,
            report.duration_ms
        );
    }
}

/// Prints a plugin's last known state as one row.
pub fn plugin_row(plugin: &ResolvedPlugin) {
    let resolved = plugin
        .resolved_ref
        .as_deref()
        .map(short_ref)
        .unwrap_or("-");

    println!(
        "  {:<24} {:<12} {:<14} {}",
        style(display_name(plugin.name(), plugin.alias())).cyan().bold(),
        resolved,
        plugin.build_status.to_string(),
        style(plugin.test_status).dim()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_message() {
        assert_eq!(selection_message("Updating", &[]), "Updating all Plugins...");
        assert_eq!(
            selection_message("Building", &["auth".to_string(), "cache".to_string()]),
            "Building Plugins matching: auth, cache..."
        );
    }

    #[test]
    fn test_short_ref() {
        let hash = "3f2a9c1d0e8b7a6f5e4d3c2b1a0f9e8d7c6b5a49";
        assert_eq!(short_ref(hash), "3f2a9c1");
        assert_eq!(short_ref("v1.2.0"), "v1.2.0");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("auth", Some("a")), "auth (a)");
        assert_eq!(display_name("auth", Some("auth")), "auth");
        assert_eq!(display_name("cache", None), "cache");
    }
}
