//! Repository facts for Replace rules.
//!
//! The `git` settings map each fact to the Replace patterns whose `%s`
//! slot should receive it:
//!
//! ```json
//! {
//!     "git": {"commit": ["@commit@"], "tag": ["@version@"]},
//!     "replace": {"all": [{"pattern": "@commit@", "replacement": "%s"}]}
//! }
//! ```
//!
//! Facts are read by running `git` in the build's base directory and are
//! memoized per plugin instance, keyed by directory and fact.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::replace::{ReplaceSettings, fill_slot};
use crate::builder::BuildConfig;
use crate::{Error, Result};

const PLUGIN: &str = "Git";

/// Default limit on a single `git` invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SHORT_LEN: usize = 7;
const STDERR_LIMIT: usize = 4096;

/// A value read from the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitFact {
    /// Full hash of `HEAD`.
    Commit,
    /// Committer date of `HEAD`.
    CommitDate,
    /// First seven characters of the commit hash.
    CommitShort,
    /// Tag pointing exactly at `HEAD`.
    CommitTag,
    /// Nearest tag, as printed by `git describe --tags`.
    Tag,
}

impl GitFact {
    /// Settings key for this fact.
    pub fn key(self) -> &'static str {
        match self {
            GitFact::Commit => "commit",
            GitFact::CommitDate => "commit-date",
            GitFact::CommitShort => "commit-short",
            GitFact::CommitTag => "commit-tag",
            GitFact::Tag => "tag",
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            GitFact::Commit | GitFact::CommitShort => &["log", "--pretty=%H", "-n1", "HEAD"],
            GitFact::CommitDate => &["log", "--pretty=%ci", "-n1", "HEAD"],
            GitFact::CommitTag => &["describe", "--tags", "--exact-match", "HEAD"],
            GitFact::Tag => &["describe", "--tags", "HEAD"],
        }
    }
}

impl fmt::Display for GitFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GitSettings {
    #[serde(default)]
    commit: Vec<String>,
    #[serde(default, rename = "commit-date")]
    commit_date: Vec<String>,
    #[serde(default, rename = "commit-short")]
    commit_short: Vec<String>,
    #[serde(default, rename = "commit-tag")]
    commit_tag: Vec<String>,
    #[serde(default)]
    tag: Vec<String>,
}

impl GitSettings {
    fn facts(&self) -> [(GitFact, &[String]); 5] {
        [
            (GitFact::Commit, self.commit.as_slice()),
            (GitFact::CommitDate, self.commit_date.as_slice()),
            (GitFact::CommitShort, self.commit_short.as_slice()),
            (GitFact::CommitTag, self.commit_tag.as_slice()),
            (GitFact::Tag, self.tag.as_slice()),
        ]
    }
}

/// Fills Replace rules with facts about the build directory's repository.
#[derive(Debug)]
pub struct GitPlugin {
    program: PathBuf,
    timeout: Duration,
    cache: HashMap<(PathBuf, GitFact), String>,
}

impl Default for GitPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl GitPlugin {
    /// Creates a plugin with the default timeout.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout: DEFAULT_TIMEOUT,
            cache: HashMap::new(),
        }
    }

    /// Sets the limit on each `git` invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `program` instead of the `git` found on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Returns the invocation limit.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Seeds the cache so `fact` in `dir` resolves without running `git`.
    pub fn remember(&mut self, dir: impl Into<PathBuf>, fact: GitFact, value: impl Into<String>) {
        self.cache.insert((dir.into(), fact), value.into());
    }

    /// Reads `fact` for the repository containing `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PluginExecution`] if `git` cannot be started, exits
    /// unsuccessfully, or exceeds the timeout.
    pub fn fact(&mut self, dir: &Path, fact: GitFact) -> Result<String> {
        let key = (dir.to_path_buf(), fact);
        if let Some(value) = self.cache.get(&key) {
            return Ok(value.clone());
        }

        let value = match fact {
            GitFact::CommitShort => self
                .fact(dir, GitFact::Commit)?
                .chars()
                .take(SHORT_LEN)
                .collect(),
            other => run_git(&self.program, dir, other.args(), self.timeout)?,
        };
        log::debug!("git {} = {}", fact, value);
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    pub(super) fn resolve(&mut self, config: &mut BuildConfig) -> Result<()> {
        let Some(mut replace) = config.settings.typed::<ReplaceSettings>("replace")? else {
            log::debug!("no replace settings, git facts not needed");
            return Ok(());
        };
        let settings: GitSettings = config.settings.typed("git")?.unwrap_or_default();
        let dir = config.directory.to_path_buf();

        for (fact, patterns) in settings.facts() {
            if patterns.is_empty() {
                continue;
            }
            let value = self.fact(&dir, fact)?;
            for pattern in patterns {
                fill_slot(PLUGIN, &mut replace, pattern, &value)?;
            }
        }
        config.settings.store("replace", &replace)
    }
}

fn run_git(program: &Path, dir: &Path, args: &[&str], timeout: Duration) -> Result<String> {
    let command = format!("{} {}", program.display(), args.join(" "));
    let failed = |reason: String| Error::PluginExecution {
        plugin: PLUGIN,
        command: command.clone(),
        reason,
    };

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            failed(format!(
                "could not start {} in '{}': {}",
                program.display(),
                dir.display(),
                e
            ))
        })?;

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(failed(format!("timed out after {:?}", timeout)));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(failed(e.to_string()));
        }
    };

    let stdout = read_pipe(child.stdout.take());
    if !status.success() {
        let mut raw = read_pipe(child.stderr.take());
        raw.truncate(STDERR_LIMIT);
        let stderr = String::from_utf8_lossy(&raw);
        let stderr = stderr.trim();
        return Err(failed(if stderr.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, stderr)
        }));
    }

    let output = match String::from_utf8(stdout) {
        Ok(output) => output,
        Err(e) => {
            log::warn!("`{}` printed non-UTF-8 output", command);
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    Ok(output.trim_matches(|c| matches!(c, '"' | ' ' | '\r' | '\n')).to_string())
}

fn read_pipe(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

trait ChildExt {
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>>;
}

impl ChildExt for Child {
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            match self.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    thread::sleep(poll_interval);
                }
            }
        }
    }
}
