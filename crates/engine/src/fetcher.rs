//! Syncs plugin working copies with their git sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use vpm_core::{PluginSpec, Settings, StageError};

use crate::runner::{CommandOutput, ProcessRunner};

/// Clones and updates working copies under `<plugins_dir>/src`.
pub struct SourceFetcher {
    runner: Arc<dyn ProcessRunner>,
    settings: Arc<Settings>,
}

impl SourceFetcher {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: Arc<Settings>) -> Self {
        Self { runner, settings }
    }

    /// Returns where the plugin's working copy lives.
    pub fn working_copy(&self, spec: &PluginSpec) -> PathBuf {
        self.settings.source_dir(&spec.name)
    }

    /// Brings the working copy to the target ref and returns the resolved commit.
    ///
    /// The target is `branch_override`, then the spec's pin, then the default
    /// channel, then the remote's default branch. Branches, tags and commit
    /// hashes are all valid targets. The spec itself is never modified.
    pub async fn sync(
        &self,
        spec: &PluginSpec,
        branch_override: Option<&str>,
    ) -> Result<String, StageError> {
        let target = spec.target_ref(branch_override, self.settings.channel.as_deref());
        let dir = self.working_copy(spec);

        if is_working_copy(&dir) {
            self.set_origin(spec, &dir).await?;
            debug!(plugin = %spec.name, "fetching remote updates");
            self.git(&strings(&["fetch", "--tags", "--prune", "origin"]), &dir)
                .await?;
        } else {
            self.fresh_clone(spec, &dir).await?;
        }

        self.checkout(&dir, target).await?;

        let head = self.head(&dir).await?;
        info!(plugin = %spec.name, target = target.unwrap_or("default"), %head, "synced");
        Ok(head)
    }

    /// Reads the commit currently checked out, without touching the network.
    pub async fn current_ref(&self, spec: &PluginSpec) -> Option<String> {
        let dir = self.working_copy(spec);
        if !is_working_copy(&dir) {
            return None;
        }

        match self.head(&dir).await {
            Ok(head) => Some(head),
            Err(e) => {
                debug!(plugin = %spec.name, error = %e, "cannot read working copy ref");
                None
            }
        }
    }

    async fn fresh_clone(&self, spec: &PluginSpec, dir: &Path) -> Result<(), StageError> {
        if dir.exists() {
            warn!(plugin = %spec.name, dir = %dir.display(), "removing directory that is not a git working copy");
            fs::remove_dir_all(dir).map_err(|e| {
                StageError::fetch(format!("cannot clear {}: {}", dir.display(), e))
            })?;
        }

        let parent = dir.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| StageError::fetch(format!("cannot create {}: {}", parent.display(), e)))?;

        let args = vec![
            "clone".to_string(),
            spec.source.clone_url(),
            dir.to_string_lossy().to_string(),
        ];
        self.git(&args, parent).await?;
        Ok(())
    }

    /// Points `origin` at the declared source if the config changed it.
    async fn set_origin(&self, spec: &PluginSpec, dir: &Path) -> Result<(), StageError> {
        let url = spec.source.clone_url();
        let current = self
            .run(&strings(&["remote", "get-url", "origin"]), dir)
            .await?;

        if current.success() && current.stdout.trim() == url {
            return Ok(());
        }

        let action = if current.success() { "set-url" } else { "add" };
        info!(plugin = %spec.name, %url, "updating origin");
        self.git(&strings(&["remote", action, "origin", &url]), dir)
            .await?;
        Ok(())
    }

    /// Checks out the target, following the remote when it is a branch.
    async fn checkout(&self, dir: &Path, target: Option<&str>) -> Result<(), StageError> {
        let Some(target) = target else {
            self.git(&strings(&["checkout", "--force", "--detach", "origin/HEAD"]), dir)
                .await?;
            return Ok(());
        };

        self.git(&strings(&["checkout", "--force", target]), dir).await?;

        // Branches move; tags and commits are already exact after checkout.
        let remote_branch = format!("refs/remotes/origin/{}", target);
        let is_branch = self
            .run(&strings(&["show-ref", "--verify", "--quiet", &remote_branch]), dir)
            .await?
            .success();

        if is_branch {
            let upstream = format!("origin/{}", target);
            self.git(&strings(&["reset", "--hard", &upstream]), dir).await?;
        }

        Ok(())
    }

    async fn head(&self, dir: &Path) -> Result<String, StageError> {
        let output = self.git(&strings(&["rev-parse", "HEAD"]), dir).await?;
        let head = output.stdout.trim().to_string();

        if head.is_empty() {
            return Err(StageError::fetch("git rev-parse returned no commit"));
        }
        Ok(head)
    }

    /// Runs git and treats a non-zero exit as a fetch error.
    async fn git(&self, args: &[String], dir: &Path) -> Result<CommandOutput, StageError> {
        let output = self.run(args, dir).await?;

        if !output.success() {
            return Err(StageError::fetch(format!(
                "git {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    async fn run(&self, args: &[String], dir: &Path) -> Result<CommandOutput, StageError> {
        self.runner
            .run(&self.settings.git, args, dir)
            .await
            .map_err(|e| StageError::fetch(format!("cannot run {}: {}", self.settings.git, e)))
    }
}

/// A `.git` file marks a worktree or submodule checkout.
fn is_working_copy(dir: &Path) -> bool {
    dir.join(".git").exists()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
