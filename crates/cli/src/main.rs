//! vpm - package manager for vroomy plugins.

mod commands;
mod discovery;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::{Result, miette};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vpm")]
#[command(author, version, about = "Fetches, builds and tests vroomy plugins")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Branch or tag to use instead of each plugin's pinned version
    #[arg(short, long, global = true)]
    branch: Option<String>,

    /// Path to config.toml (searched upward from the current directory if not specified)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of plugins processed in parallel
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and build plugins
    Update {
        /// Plugin names or aliases (all plugins if none given)
        plugins: Vec<String>,
    },

    /// Build plugins from their current working copies
    Build {
        /// Plugin names or aliases (all plugins if none given)
        plugins: Vec<String>,
    },

    /// Run plugin test suites
    Test {
        /// Plugin names or aliases (all plugins if none given)
        plugins: Vec<String>,
    },

    /// Show the last known state of plugins
    List {
        /// Plugin names or aliases (all plugins if none given)
        plugins: Vec<String>,
    },

    /// Print the vpm version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => Err(miette!("Interrupted")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never mix with command output.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "vpm_engine=debug,vpm_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("vpm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = match &cli.global.config {
        Some(path) => path.clone(),
        None => discovery::find_config()?,
    };
    let orchestrator = commands::open(&config_path, cli.global.jobs)?;
    let branch = cli.global.branch.as_deref();

    match cli.command {
        Commands::Update { plugins } => commands::update::execute(&orchestrator, branch, &plugins).await,
        Commands::Build { plugins } => commands::build::execute(&orchestrator, &plugins).await,
        Commands::Test { plugins } => commands::test::execute(&orchestrator, &plugins).await,
        Commands::List { plugins } => commands::list::execute(&orchestrator, &plugins).await,
        Commands::Version => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_with_branch_and_filter() {
        let cli = Cli::try_parse_from(["vpm", "update", "cache", "-b", "dev"]).unwrap();

        assert_eq!(cli.global.branch.as_deref(), Some("dev"));
        match cli.command {
            Commands::Update { plugins } => assert_eq!(plugins, vec!["cache"]),
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_global_flags_before_subcommand() {
        let cli = Cli::try_parse_from(["vpm", "-j", "2", "--config", "/srv/config.toml", "list"])
            .unwrap();

        assert_eq!(cli.global.jobs, Some(2));
        assert_eq!(cli.global.config, Some(PathBuf::from("/srv/config.toml")));
        assert!(matches!(cli.command, Commands::List { ref plugins } if plugins.is_empty()));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["vpm"]).is_err());
    }
}
