//! Plugin declarations.

use std::fmt;
use std::path::{Path, PathBuf};

/// A plugin as declared in the config file.
///
/// Specs are immutable once loaded. Per-invocation overrides such as a
/// `--branch` flag are passed alongside the spec and never written into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    /// Unique plugin name.
    pub name: String,

    /// Optional secondary key, unique across names and aliases.
    pub alias: Option<String>,

    /// Where the plugin source lives.
    pub source: Source,

    /// Pinned branch or version tag.
    pub branch: Option<String>,

    /// Package path built into the artifact, relative to the working copy.
    pub entry: String,
}

/// Location of a plugin's git repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A remote repository URL.
    Remote(String),

    /// A repository on the local filesystem.
    Local(PathBuf),
}

impl PluginSpec {
    /// Creates a new spec with the given name and source.
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            alias: None,
            source,
            branch: None,
            entry: ".".to_string(),
        }
    }

    /// Sets the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the pinned branch or version.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the build entry point.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Returns the ref to check out: the override, then the pin, then the channel.
    pub fn target_ref<'a>(
        &'a self,
        branch_override: Option<&'a str>,
        channel: Option<&'a str>,
    ) -> Option<&'a str> {
        branch_override.or(self.branch.as_deref()).or(channel)
    }
}

impl Source {
    /// Interprets a declared source string.
    ///
    /// URLs and scp-style addresses are kept as-is, paths are resolved against
    /// `base_dir`, and bare host paths such as `github.com/vroomy/auth` are
    /// fetched over https.
    pub fn parse(raw: &str, base_dir: &Path) -> Self {
        let raw = raw.trim();

        if raw.contains("://") || raw.starts_with("git@") {
            return Self::Remote(raw.to_string());
        }

        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return Self::Local(home.join(rest));
            }
        }

        if raw.starts_with('/') || raw.starts_with("./") || raw.starts_with("../") {
            let path = Path::new(raw);
            if path.is_absolute() {
                return Self::Local(path.to_path_buf());
            }
            return Self::Local(base_dir.join(path));
        }

        Self::Remote(format!("https://{}", raw))
    }

    /// Returns the string handed to `git clone`.
    pub fn clone_url(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Local(path) => path.to_string_lossy().to_string(),
        }
    }

    /// Derives a plugin name from the last path segment.
    pub fn default_name(&self) -> Option<String> {
        let location = self.clone_url();
        let segment = location
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()?
            .trim_end_matches(".git");

        if segment.is_empty() {
            None
        } else {
            Some(segment.to_string())
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{}", url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
