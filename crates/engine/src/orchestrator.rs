//! Parallel plugin lifecycle orchestration.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vpm_core::{
    Config, Operation, OperationReport, PipelineState, PluginOutcome, PluginSpec, ResolvedPlugin,
    Result, Settings, StageError, TestResult, TestStatus, VpmError,
};

use crate::builder::BuildRunner;
use crate::fetcher::SourceFetcher;
use crate::registry::Registry;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::state::StateLedger;
use crate::tester::TestRunner;

/// Drives fetch, build and test pipelines across the selected plugins.
///
/// Each targeted plugin gets its own task; at most `max_parallelism` run at
/// once. Stages within one plugin are sequential and a failure stops only
/// that plugin. Dropping an operation's future aborts its tasks, which kills
/// any subprocess still running.
pub struct Orchestrator {
    /// Declared plugins and their runtime records.
    registry: Arc<Registry>,

    /// Fetch, build and test stages.
    stages: Arc<Stages>,

    /// Global settings from the config.
    settings: Arc<Settings>,

    /// Last known state, persisted after each mutating operation.
    ledger: Mutex<StateLedger>,

    /// Maximum number of concurrent pipelines.
    max_parallelism: usize,
}

struct Stages {
    fetcher: SourceFetcher,
    builder: BuildRunner,
    tester: TestRunner,
}

/// One plugin's pipeline for one operation.
struct Pipeline {
    registry: Arc<Registry>,
    stages: Arc<Stages>,
    spec: Arc<PluginSpec>,
    operation: Operation,
    branch_override: Option<String>,
}

impl Orchestrator {
    /// Creates an orchestrator that runs real git and go processes.
    pub fn new(config: Config) -> Result<Self> {
        let runner = CommandRunner::new().with_timeout(config.settings.timeout);
        Self::with_runner(config, Arc::new(runner))
    }

    /// Creates an orchestrator that runs every subprocess through `runner`.
    pub fn with_runner(config: Config, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        let settings = Arc::new(config.settings);
        let registry = Arc::new(Registry::new(config.plugins)?);
        let ledger = StateLedger::open(settings.state_path());

        let stages = Arc::new(Stages {
            fetcher: SourceFetcher::new(runner.clone(), settings.clone()),
            builder: BuildRunner::new(runner.clone(), settings.clone()),
            tester: TestRunner::new(runner, settings.clone()),
        });

        let max_parallelism = settings.jobs.unwrap_or_else(num_cpus::get).max(1);

        Ok(Self {
            registry,
            stages,
            settings,
            ledger: Mutex::new(ledger),
            max_parallelism,
        })
    }

    /// Sets the maximum parallelism.
    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.max_parallelism = max.max(1);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fetches each selected plugin at its target ref, then builds it.
    ///
    /// `branch_override` replaces every target's pinned branch for this call
    /// only.
    pub async fn update_plugins(
        &self,
        branch_override: Option<&str>,
        names: &[String],
    ) -> Result<OperationReport> {
        self.execute(Operation::Update, branch_override, names).await
    }

    /// Builds the currently checked out source of each selected plugin.
    pub async fn build_plugins(&self, names: &[String]) -> Result<OperationReport> {
        self.execute(Operation::Build, None, names).await
    }

    /// Runs the test suite of each selected plugin.
    pub async fn test_plugins(&self, names: &[String]) -> Result<OperationReport> {
        self.execute(Operation::Test, None, names).await
    }

    /// Returns the last known state of each selected plugin.
    ///
    /// Reads the ledger, the artifacts and the working copies' current
    /// commits; nothing is fetched, built or tested.
    pub async fn list_plugins(&self, names: &[String]) -> Result<Vec<ResolvedPlugin>> {
        let specs = self.registry.select(names)?;
        let mut plugins = Vec::with_capacity(specs.len());

        for spec in &specs {
            let mut plugin = self.touch(spec);

            if let Some(head) = self.stages.fetcher.current_ref(spec).await {
                plugin = self.registry.update(spec, |p| {
                    p.resolved_ref = Some(head);
                    p.clone()
                });
            }

            plugins.push(plugin);
        }

        Ok(plugins)
    }

    async fn execute(
        &self,
        operation: Operation,
        branch_override: Option<&str>,
        names: &[String],
    ) -> Result<OperationReport> {
        let start = Instant::now();
        let targets = self.registry.select(names)?;

        info!(%operation, targets = targets.len(), "starting");

        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let mut workers = JoinSet::new();

        for (index, spec) in targets.iter().enumerate() {
            self.touch(spec);
            self.registry.update(spec, |p| {
                p.state = PipelineState::Pending;
                p.last_error = None;
            });

            let pipeline = Pipeline {
                registry: self.registry.clone(),
                stages: self.stages.clone(),
                spec: spec.clone(),
                operation,
                branch_override: branch_override.map(str::to_string),
            };
            let semaphore = semaphore.clone();

            workers.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                (index, pipeline.run().await)
            });
        }

        let mut outcomes: Vec<Option<PluginOutcome>> = vec![None; targets.len()];

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => return Err(VpmError::Io(io::Error::other(e))),
            }
        }

        self.persist(&targets);

        let report = OperationReport {
            operation,
            outcomes: outcomes.into_iter().flatten().collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if report.is_success() {
            Ok(report)
        } else {
            Err(VpmError::PluginsFailed(Box::new(report)))
        }
    }

    /// Returns a plugin's record, seeding it from the ledger on first touch.
    fn touch(&self, spec: &Arc<PluginSpec>) -> ResolvedPlugin {
        let artifact_path = self.settings.artifact_path(&spec.name);
        let ledger = self.lock_ledger();
        self.registry
            .touch(spec, |plugin| ledger.apply(plugin, &artifact_path))
    }

    fn persist(&self, targets: &[Arc<PluginSpec>]) {
        let mut ledger = self.lock_ledger();

        for spec in targets {
            if let Some(plugin) = self.registry.get(&spec.name) {
                ledger.record(&plugin);
            }
        }

        if let Err(e) = ledger.save() {
            warn!(error = %e, "failed to save state ledger");
        }
    }

    fn lock_ledger(&self) -> MutexGuard<'_, StateLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Pipeline {
    async fn run(self) -> PluginOutcome {
        let mut test = None;
        let result = self.run_stages(&mut test).await;

        let plugin = self.registry.update(&self.spec, |p| {
            match &result {
                Ok(()) if test.as_ref().is_some_and(|t: &TestResult| !t.passed) => {
                    p.fail("test suite failed");
                }
                Ok(()) => p.state = PipelineState::Succeeded,
                Err(e) => p.fail(e.to_string()),
            }
            p.clone()
        });

        if let Err(e) = &result {
            warn!(plugin = %self.spec.name, kind = e.kind(), error = %e, "pipeline failed");
        }

        PluginOutcome {
            name: plugin.spec.name.clone(),
            alias: plugin.spec.alias.clone(),
            state: plugin.state,
            resolved_ref: plugin.resolved_ref,
            artifact: plugin.artifact,
            test,
            error: result.err(),
        }
    }

    async fn run_stages(&self, test: &mut Option<TestResult>) -> std::result::Result<(), StageError> {
        let stages = &self.stages;
        let spec = &self.spec;
        let working_copy = stages.fetcher.working_copy(spec);

        if self.operation == Operation::Update {
            self.set_state(PipelineState::Fetching);
            let head = stages
                .fetcher
                .sync(spec, self.branch_override.as_deref())
                .await?;
            self.registry.update(spec, |p| p.resolved_ref = Some(head));
        } else if let Some(head) = stages.fetcher.current_ref(spec).await {
            self.registry.update(spec, |p| p.resolved_ref = Some(head));
        }

        if matches!(self.operation, Operation::Update | Operation::Build) {
            self.set_state(PipelineState::Building);
            match stages.builder.build(spec, &working_copy).await {
                Ok(artifact) => self.registry.update(spec, |p| p.mark_built(artifact)),
                Err(e) => {
                    self.registry
                        .update(spec, |p| p.mark_build_failed(e.to_string()));
                    return Err(e);
                }
            }
        }

        if self.operation == Operation::Test {
            self.set_state(PipelineState::Testing);
            match stages.tester.test(spec, &working_copy).await {
                Ok(result) => {
                    let status = if result.passed {
                        TestStatus::Passed
                    } else {
                        TestStatus::Failed
                    };
                    self.registry.update(spec, |p| p.test_status = status);
                    *test = Some(result);
                }
                Err(e) => {
                    self.registry
                        .update(spec, |p| p.test_status = TestStatus::Errored);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn set_state(&self, state: PipelineState) {
        self.registry.update(&self.spec, |p| p.state = state);
    }
}
