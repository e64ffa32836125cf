//! Persisted last-known status of each plugin.
//!
//! Working copies and artifacts are the real durable state; the ledger only
//! remembers what the last operation concluded so `vpm list` can report it.
//! Artifacts are fingerprinted with blake3 so a replaced or deleted artifact
//! shows up as stale instead of built.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;
use vpm_core::{BuildStatus, ResolvedPlugin, TestStatus};

/// Ledger stored at `<plugins_dir>/.vpm/state.json`.
#[derive(Debug)]
pub struct StateLedger {
    path: PathBuf,
    entries: HashMap<String, LedgerEntry>,
}

/// What the ledger remembers about one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub resolved_ref: Option<String>,
    pub artifact: Option<PathBuf>,

    /// blake3 hash of the artifact when it was recorded.
    pub artifact_hash: Option<String>,

    pub build_status: BuildStatus,
    pub test_status: TestStatus,

    /// Seconds since the epoch when the entry was written.
    pub timestamp: u64,
}

impl StateLedger {
    /// Opens the ledger, starting empty if it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match Self::load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable state ledger");
                HashMap::new()
            }
        };

        Self { path, entries }
    }

    fn load_entries(path: &Path) -> io::Result<HashMap<String, LedgerEntry>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(io::Error::other)
    }

    /// Writes the ledger to disk.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.entries).map_err(io::Error::other)?;
        fs::write(&self.path, content)
    }

    /// Records the current state of a plugin.
    pub fn record(&mut self, plugin: &ResolvedPlugin) {
        let artifact_hash = plugin
            .artifact
            .as_deref()
            .and_then(|path| hash_file(path).ok());

        let entry = LedgerEntry {
            resolved_ref: plugin.resolved_ref.clone(),
            artifact: plugin.artifact.clone(),
            artifact_hash,
            build_status: plugin.build_status,
            test_status: plugin.test_status,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        self.entries.insert(plugin.name().to_string(), entry);
    }

    /// Fills a fresh record with the last known state.
    ///
    /// A recorded build whose artifact is missing or changed becomes `Stale`.
    /// Without a ledger entry, an existing artifact at `artifact_path` is
    /// taken as evidence of a successful build.
    pub fn apply(&self, plugin: &mut ResolvedPlugin, artifact_path: &Path) {
        let Some(entry) = self.entries.get(plugin.name()) else {
            infer_from_artifact(plugin, artifact_path);
            return;
        };

        plugin.resolved_ref = entry.resolved_ref.clone();
        plugin.test_status = entry.test_status;

        match entry.build_status {
            BuildStatus::Built => {
                let artifact = entry.artifact.as_deref().unwrap_or(artifact_path);
                let current = hash_file(artifact).ok();

                if current.is_some() && current == entry.artifact_hash {
                    plugin.mark_built(artifact.to_path_buf());
                } else {
                    plugin.build_status = BuildStatus::Stale;
                }
            }
            BuildStatus::Unknown => infer_from_artifact(plugin, artifact_path),
            status => plugin.build_status = status,
        }
    }
}

fn infer_from_artifact(plugin: &mut ResolvedPlugin, artifact_path: &Path) {
    if artifact_path.is_file() {
        plugin.mark_built(artifact_path.to_path_buf());
    }
}

/// Hashes a file using blake3.
fn hash_file(path: &Path) -> io::Result<String> {
    let content = fs::read(path)?;
    Ok(blake3::hash(&content).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use vpm_core::{PluginSpec, Source};

    fn plugin(name: &str) -> ResolvedPlugin {
        ResolvedPlugin::new(Arc::new(PluginSpec::new(name, Source::Remote("u".into()))))
    }

    #[test]
    fn test_record_save_and_reload() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("auth.so");
        fs::write(&artifact, "binary").unwrap();

        let ledger_path = dir.path().join(".vpm/state.json");
        let mut ledger = StateLedger::open(&ledger_path);

        let mut auth = plugin("auth");
        auth.resolved_ref = Some("abc123".to_string());
        auth.mark_built(artifact.clone());
        auth.test_status = TestStatus::Passed;
        ledger.record(&auth);
        ledger.save().unwrap();

        let reloaded = StateLedger::open(&ledger_path);
        let mut fresh = plugin("auth");
        reloaded.apply(&mut fresh, &artifact);

        assert_eq!(fresh.resolved_ref.as_deref(), Some("abc123"));
        assert_eq!(fresh.build_status, BuildStatus::Built);
        assert_eq!(fresh.artifact, Some(artifact));
        assert_eq!(fresh.test_status, TestStatus::Passed);
    }

    #[test]
    fn test_changed_artifact_is_stale() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("auth.so");
        fs::write(&artifact, "binary").unwrap();

        let mut ledger = StateLedger::open(dir.path().join("state.json"));
        let mut auth = plugin("auth");
        auth.mark_built(artifact.clone());
        ledger.record(&auth);

        fs::write(&artifact, "replaced").unwrap();

        let mut fresh = plugin("auth");
        ledger.apply(&mut fresh, &artifact);
        assert_eq!(fresh.build_status, BuildStatus::Stale);
        assert_eq!(fresh.artifact, None);

        fs::remove_file(&artifact).unwrap();
        let mut missing = plugin("auth");
        ledger.apply(&mut missing, &artifact);
        assert_eq!(missing.build_status, BuildStatus::Stale);
    }

    #[test]
    fn test_infers_build_from_artifact_without_entry() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("cache.so");
        let ledger = StateLedger::open(dir.path().join("state.json"));

        let mut none = plugin("cache");
        ledger.apply(&mut none, &artifact);
        assert_eq!(none.build_status, BuildStatus::Unknown);

        fs::write(&artifact, "binary").unwrap();
        let mut built = plugin("cache");
        ledger.apply(&mut built, &artifact);
        assert_eq!(built.build_status, BuildStatus::Built);
    }

    #[test]
    fn test_corrupt_ledger_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let ledger = StateLedger::open(&path);
        let mut auth = plugin("auth");
        ledger.apply(&mut auth, &dir.path().join("auth.so"));
        assert_eq!(auth.build_status, BuildStatus::Unknown);
        assert_eq!(auth.resolved_ref, None);
    }
}
