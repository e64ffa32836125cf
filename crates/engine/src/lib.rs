//! vpm engine - fetches, builds and tests vroomy plugins.

mod builder;
mod fetcher;
mod orchestrator;
mod registry;
mod runner;
mod state;
mod tester;

#[cfg(test)]
mod testing;

pub use builder::BuildRunner;
pub use fetcher::SourceFetcher;
pub use orchestrator::Orchestrator;
pub use registry::Registry;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use state::{LedgerEntry, StateLedger};
pub use tester::TestRunner;
