//! Git operations through the git CLI.
//!
//! All invocations go through a [`ProcessRunner`] with hardening applied:
//! - `core.hooksPath=` - disable hooks execution
//! - the clone URL is passed as a secret argument and scrubbed from any
//!   captured output before it reaches an error
//!
//! `git clone` records the URL it was given as `remote.origin.url`, so
//! [`strip_remote_credentials`] rewrites it once the clone is done.

use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;

use super::paths::GIT_DIR;
use crate::connection::AuthenticatedUrl;
use crate::process::{Arg, ProcessOutput, ProcessRunner, SystemRunner};

/// Repository config file inside the git dir.
const CONFIG_FILE: &str = "config";

/// The git subcommand that was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOperation {
    Clone,
    Checkout,
    Version,
}

impl fmt::Display for GitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GitOperation::Clone => "clone",
            GitOperation::Checkout => "checkout",
            GitOperation::Version => "--version",
        };
        f.write_str(name)
    }
}

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// git could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[from] io::Error),
    /// git exited unsuccessfully. `output` never contains the credential.
    #[error("git {operation} failed ({}): {output}", describe_exit(.code))]
    Failed {
        operation: GitOperation,
        code: Option<i32>,
        output: String,
    },
    /// A path could not be passed to git.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

impl GitError {
    /// Scrub `url` and its credential from captured process output.
    pub fn redact(self, url: &AuthenticatedUrl) -> Self {
        match self {
            GitError::Failed {
                operation,
                code,
                output,
            } => GitError::Failed {
                operation,
                code,
                output: url.redact(&output),
            },
            other => other,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Git CLI wrapper with security hardening.
pub struct GitCli<R = SystemRunner> {
    runner: R,
    git_path: String,
}

impl Default for GitCli<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli<SystemRunner> {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self::with_runner(SystemRunner::new())
    }
}

impl<R: ProcessRunner> GitCli<R> {
    /// Create a GitCli that runs `git` through `runner`.
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            git_path: "git".into(),
        }
    }

    /// Use a different git executable (name on `PATH`, or absolute path).
    pub fn with_git_path(mut self, git_path: impl Into<String>) -> Self {
        self.git_path = git_path.into();
        self
    }

    #[cfg(test)]
    fn runner(&self) -> &R {
        &self.runner
    }

    /// Build the hardened argument list for a git invocation.
    fn command(&self, args: impl IntoIterator<Item = Arg>) -> Vec<Arg> {
        let mut command: Vec<Arg> = vec!["-c".into(), "core.hooksPath=".into()];
        command.extend(args);
        command
    }

    fn run(&self, operation: GitOperation, args: Vec<Arg>) -> Result<ProcessOutput, GitError> {
        let output = self.runner.run(&self.git_path, &args)?;
        if !output.success() {
            return Err(GitError::Failed {
                operation,
                code: output.code,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    /// Clone `url` into `dest`.
    ///
    /// Runs `git clone <url> <dest>`. The caller owns `dest` and is
    /// responsible for removing it if the clone fails.
    pub fn clone_repository(&self, url: &AuthenticatedUrl, dest: &Path) -> Result<(), GitError> {
        let dest_str = utf8(dest)?;
        let args = self.command([Arg::from("clone"), url.to_arg(), Arg::from(dest_str)]);

        self.run(GitOperation::Clone, args)
            .map(|_| ())
            .map_err(|err| err.redact(url))
    }

    /// Set the working tree of a freshly cloned repository to `reference`.
    ///
    /// Runs `git --work-tree=<dest> --git-dir=<dest>/.git checkout <reference>`,
    /// so the result does not depend on the current directory.
    pub fn checkout(&self, work_tree: &Path, reference: &str) -> Result<(), GitError> {
        let work_tree_str = utf8(work_tree)?;
        let git_dir = work_tree.join(GIT_DIR);
        let git_dir_str = utf8(&git_dir)?;

        let args = self.command([
            Arg::from(format!("--work-tree={work_tree_str}")),
            Arg::from(format!("--git-dir={git_dir_str}")),
            Arg::from("checkout"),
            Arg::from(reference),
        ]);

        self.run(GitOperation::Checkout, args).map(|_| ())
    }

    /// Report the installed git version, e.g. `git version 2.43.0`.
    pub fn version(&self) -> Result<String, GitError> {
        let output = self.run(GitOperation::Version, self.command([Arg::from("--version")]))?;
        Ok(output.stdout.trim().to_string())
    }
}

/// Replace the authenticated remote URL that `git clone` recorded in
/// `<work_tree>/.git/config` with its credential-free form.
///
/// Edits the file directly rather than running `git remote set-url`.
pub fn strip_remote_credentials(work_tree: &Path, url: &AuthenticatedUrl) -> io::Result<()> {
    let config_path = work_tree.join(GIT_DIR).join(CONFIG_FILE);
    let config = match std::fs::read_to_string(&config_path) {
        Ok(config) => config,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !url.is_exposed_in(&config) {
        return Ok(());
    }
    log::debug!("Removing credentials from {}", config_path.display());
    std::fs::write(&config_path, url.anonymize(&config))
}

fn utf8(path: &Path) -> Result<&str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::NonUtf8Path(path.display().to_string()))
}
