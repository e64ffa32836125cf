//! In-memory stand-in for git and go used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::runner::{CommandOutput, ProcessRunner};

/// A recorded call to the fake runner.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
}

impl Invocation {
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// Plugin the call acted on, derived from the clone target or working dir.
    pub fn plugin(&self) -> String {
        let path = if self.subcommand() == "clone" {
            self.args.last().map(PathBuf::from).unwrap_or_default()
        } else {
            self.dir.clone()
        };
        file_name(&path)
    }
}

/// Simulates git and go against a temporary plugins directory.
///
/// Clones create a `.git` directory and remember their URL as `origin`,
/// builds write the artifact named after `-o`, and `rev-parse HEAD` reports
/// `<ref>-sha` for the last ref checked out.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    refs: Mutex<HashMap<String, String>>,
    origins: Mutex<HashMap<String, String>>,
    missing: HashSet<String>,
    failing_fetch: HashSet<String>,
    failing_builds: HashSet<String>,
    failing_tests: HashSet<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_program(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    pub fn with_failing_fetch(mut self, plugin: &str) -> Self {
        self.failing_fetch.insert(plugin.to_string());
        self
    }

    pub fn with_failing_build(mut self, plugin: &str) -> Self {
        self.failing_builds.insert(plugin.to_string());
        self
    }

    pub fn with_failing_tests(mut self, plugin: &str) -> Self {
        self.failing_tests.insert(plugin.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    /// Calls made for one plugin with the given program and subcommand.
    pub fn calls_for(&self, plugin: &str, program: &str, subcommand: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program && c.subcommand() == subcommand && c.plugin() == plugin)
            .collect()
    }

    /// Returns the URL `origin` points at in a plugin's working copy.
    pub fn origin(&self, plugin: &str) -> Option<String> {
        lock(&self.origins).get(plugin).cloned()
    }

    fn git(&self, call: &Invocation) -> io::Result<CommandOutput> {
        let plugin = call.plugin();

        match call.subcommand() {
            "clone" | "fetch" if self.failing_fetch.contains(&plugin) => {
                Ok(exit(128, "", "fatal: repository not found"))
            }
            "clone" => {
                let dest = call.args.last().map(PathBuf::from).unwrap_or_default();
                fs::create_dir_all(dest.join(".git"))?;
                if let Some(url) = call.args.iter().rev().nth(1) {
                    lock(&self.origins).insert(plugin.clone(), url.clone());
                }
                lock(&self.refs).insert(plugin, "HEAD".to_string());
                Ok(exit(0, "", ""))
            }
            "remote" => match call.args.get(1).map(String::as_str) {
                Some("get-url") => match lock(&self.origins).get(&plugin) {
                    Some(url) => Ok(exit(0, &format!("{}\n", url), "")),
                    None => Ok(exit(2, "", "error: No such remote 'origin'")),
                },
                Some("set-url" | "add") => {
                    if let Some(url) = call.args.get(3) {
                        lock(&self.origins).insert(plugin, url.clone());
                    }
                    Ok(exit(0, "", ""))
                }
                _ => Ok(exit(0, "", "")),
            },
            "checkout" => {
                if let Some(target) = call.args.last() {
                    lock(&self.refs).insert(plugin, target.clone());
                }
                Ok(exit(0, "", ""))
            }
            "rev-parse" => {
                let head = lock(&self.refs)
                    .get(&plugin)
                    .cloned()
                    .unwrap_or_else(|| "HEAD".to_string());
                Ok(exit(0, &format!("{}-sha\n", head), ""))
            }
            _ => Ok(exit(0, "", "")),
        }
    }

    fn go(&self, call: &Invocation) -> io::Result<CommandOutput> {
        let plugin = call.plugin();

        match call.subcommand() {
            "build" if self.failing_builds.contains(&plugin) => {
                Ok(exit(2, "", "./plugin.go:3:2: undefined: Handler"))
            }
            "build" => {
                if let Some(artifact) = flag_value(&call.args, "-o") {
                    let artifact = Path::new(artifact);
                    if let Some(parent) = artifact.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(artifact, format!("artifact:{}", plugin))?;
                }
                Ok(exit(0, "", ""))
            }
            "test" if self.failing_tests.contains(&plugin) => {
                Ok(exit(1, "--- FAIL: TestHandler (0.00s)\nFAIL", ""))
            }
            "test" => Ok(exit(0, "ok  \tplugin\t0.012s", "")),
            _ => Ok(exit(0, "", "")),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> io::Result<CommandOutput> {
        let call = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            dir: working_dir.to_path_buf(),
        };
        lock(&self.calls).push(call.clone());

        if self.missing.contains(program) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("'{}' not found", program),
            ));
        }

        match program {
            "git" => self.git(&call),
            "go" => self.go(&call),
            _ => Ok(exit(0, "", "")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn exit(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
