//! Config store: plugin declarations and global settings.
//!
//! The config is a TOML file, usually the host's own `config.toml`. Keys that
//! vpm does not know about are ignored so the file can be shared with the host.
//!
//! Plugins are declared either as shorthand strings or as tables:
//!
//! ```toml
//! channel = "master"
//! plugins = ["github.com/vroomy/cors#v0.4.0 as cors"]
//!
//! [[plugin]]
//! source = "github.com/vroomy/auth"
//! alias = "a"
//! branch = "v1.2.0"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VpmError};
use crate::plugin::{PluginSpec, Source};

/// Default plugins directory, relative to the config file.
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// A loaded and validated config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the config file.
    pub path: PathBuf,

    /// Global settings.
    pub settings: Settings,

    /// Declared plugins, in declaration order.
    pub plugins: Vec<PluginSpec>,
}

/// Global settings shared by every plugin.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Branch used when a plugin has no pin.
    pub channel: Option<String>,

    /// Root for working copies, artifacts and the state ledger.
    pub plugins_dir: PathBuf,

    /// git executable.
    pub git: String,

    /// go executable.
    pub go: String,

    /// Worker limit; `None` means one per CPU.
    pub jobs: Option<usize>,

    /// Per-subprocess timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    channel: Option<String>,
    plugins_dir: Option<String>,
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    toolchain: RawToolchain,
    #[serde(default)]
    plugins: Vec<RawPlugin>,
    #[serde(default)]
    plugin: Vec<RawPluginTable>,
}

#[derive(Debug, Default, Deserialize)]
struct RawToolchain {
    git: Option<String>,
    go: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlugin {
    Short(String),
    Table(RawPluginTable),
}

#[derive(Debug, Deserialize)]
struct RawPluginTable {
    name: Option<String>,
    alias: Option<String>,
    source: String,
    #[serde(alias = "version")]
    branch: Option<String>,
    entry: Option<String>,
}

impl Config {
    /// Loads and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(VpmError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| VpmError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        // Tools run inside working copies, so every derived path must be absolute.
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let base_dir = std::path::absolute(parent).map_err(|e| VpmError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse_at(&content, path, &base_dir)
    }

    /// Parses a config from a string, resolving relative paths against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        Self::parse_at(content, &base_dir.join("<string>"), base_dir)
    }

    fn parse_at(content: &str, path: &Path, base_dir: &Path) -> Result<Self> {
        let invalid = |message: String| VpmError::Config {
            path: path.to_path_buf(),
            message,
        };

        let raw: RawConfig = toml::from_str(content).map_err(|e| invalid(e.message().to_string()))?;

        if raw.jobs == Some(0) {
            return Err(invalid("jobs must be at least 1".to_string()));
        }

        let plugins_dir = raw
            .plugins_dir
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PLUGINS_DIR);

        let settings = Settings {
            channel: non_empty(raw.channel),
            plugins_dir: resolve_dir(plugins_dir, base_dir),
            git: non_empty(raw.toolchain.git).unwrap_or_else(|| "git".to_string()),
            go: non_empty(raw.toolchain.go).unwrap_or_else(|| "go".to_string()),
            jobs: raw.jobs,
            timeout: raw.timeout_secs.map(Duration::from_secs),
        };

        let mut plugins = Vec::new();
        let declarations = raw
            .plugins
            .into_iter()
            .chain(raw.plugin.into_iter().map(RawPlugin::Table));

        for declaration in declarations {
            let spec = match declaration {
                RawPlugin::Short(line) => parse_shorthand(&line, base_dir),
                RawPlugin::Table(table) => convert_table(table, base_dir),
            }
            .map_err(invalid)?;

            plugins.push(spec);
        }

        validate_keys(&plugins)?;

        Ok(Self {
            path: path.to_path_buf(),
            settings,
            plugins,
        })
    }
}

impl Settings {
    /// Working copy location for a plugin.
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.plugins_dir.join("src").join(name)
    }

    /// Artifact location for a plugin.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.plugins_dir.join("build").join(format!("{}.so", name))
    }

    /// Location of the persisted state ledger.
    pub fn state_path(&self) -> PathBuf {
        self.plugins_dir.join(".vpm").join("state.json")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel: None,
            plugins_dir: PathBuf::from(DEFAULT_PLUGINS_DIR),
            git: "git".to_string(),
            go: "go".to_string(),
            jobs: None,
            timeout: None,
        }
    }
}

/// Parses `source[#version][ as alias]`.
fn parse_shorthand(line: &str, base_dir: &Path) -> std::result::Result<PluginSpec, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let (location, alias) = match tokens.as_slice() {
        [location] => (*location, None),
        [location, "as", alias] => (*location, Some(*alias)),
        _ => {
            return Err(format!(
                "invalid plugin declaration '{}', expected 'source[#version][ as alias]'",
                line
            ));
        }
    };

    let (location, branch) = match location.split_once('#') {
        Some((location, branch)) => (location, Some(branch.to_string())),
        None => (location, None),
    };

    build_spec(
        None,
        alias.map(str::to_string),
        location,
        branch,
        None,
        base_dir,
    )
}

fn convert_table(
    table: RawPluginTable,
    base_dir: &Path,
) -> std::result::Result<PluginSpec, String> {
    build_spec(
        table.name,
        table.alias,
        &table.source,
        table.branch,
        table.entry,
        base_dir,
    )
}

fn build_spec(
    name: Option<String>,
    alias: Option<String>,
    location: &str,
    branch: Option<String>,
    entry: Option<String>,
    base_dir: &Path,
) -> std::result::Result<PluginSpec, String> {
    if location.trim().is_empty() {
        return Err("plugin source must not be empty".to_string());
    }

    let source = Source::parse(location, base_dir);

    let name = match non_empty(name) {
        Some(name) => name,
        None => source
            .default_name()
            .ok_or_else(|| format!("cannot derive a plugin name from '{}'", location))?,
    };

    validate_key(&name)?;

    let mut spec = PluginSpec::new(name, source);

    if let Some(alias) = non_empty(alias) {
        validate_key(&alias)?;
        spec = spec.with_alias(alias);
    }

    if let Some(branch) = non_empty(branch) {
        spec = spec.with_branch(branch);
    }

    if let Some(entry) = non_empty(entry) {
        spec = spec.with_entry(entry);
    }

    Ok(spec)
}

/// Names end up as directory and file names.
fn validate_key(key: &str) -> std::result::Result<(), String> {
    if key.contains(['/', '\\']) || key.chars().any(char::is_whitespace) || key.starts_with('.') {
        return Err(format!("invalid plugin name or alias '{}'", key));
    }
    Ok(())
}

/// Ensures names and aliases form one namespace without collisions.
fn validate_keys(plugins: &[PluginSpec]) -> Result<()> {
    let mut owners: HashMap<&str, &str> = HashMap::new();

    for spec in plugins {
        let mut keys = vec![spec.name.as_str()];
        if let Some(alias) = spec.alias.as_deref() {
            if alias != spec.name {
                keys.push(alias);
            }
        }

        for key in keys {
            if let Some(first) = owners.insert(key, &spec.name) {
                return Err(VpmError::DuplicatePlugin {
                    key: key.to_string(),
                    first: first.to_string(),
                    second: spec.name.clone(),
                });
            }
        }
    }

    Ok(())
}

fn resolve_dir(dir: &str, base_dir: &Path) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    base_dir.join(dir)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
