//! Running external programs.
//!
//! Everything that leaves the process goes through [`ProcessRunner`]. Arguments
//! are typed so that a secret (the authenticated clone URL) can be handed to a
//! child process while every logged rendering of the command line shows `***`.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use secrecy::{ExposeSecret, SecretString};

/// A single command-line argument.
pub enum Arg {
    /// An argument that is safe to log.
    Plain(OsString),
    /// An argument that must never be logged or shown in an error.
    Secret(SecretString),
}

impl Arg {
    /// Returns the raw argument. Only for handing to a child process.
    pub fn expose(&self) -> &OsStr {
        match self {
            Arg::Plain(value) => value.as_os_str(),
            Arg::Secret(value) => OsStr::new(value.expose_secret()),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Arg::Secret(_))
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Plain(value) => write!(f, "{}", value.to_string_lossy()),
            Arg::Secret(_) => write!(f, "***"),
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Arg::Secret(_) => f.write_str("Secret(***)"),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Plain(value.into())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Plain(value.into())
    }
}

impl From<OsString> for Arg {
    fn from(value: OsString) -> Self {
        Arg::Plain(value)
    }
}

impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::Plain(value.as_os_str().to_owned())
    }
}

/// Render a command line for logging, with secrets masked.
pub fn render_args(args: &[Arg]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Output suitable for diagnostics: stderr first, then stdout.
    pub fn combined(&self) -> String {
        [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Executes external programs and reports their exit status and output.
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[Arg]) -> io::Result<ProcessOutput>;
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    fn run(&self, program: &str, args: &[Arg]) -> io::Result<ProcessOutput> {
        (**self).run(program, args)
    }
}

/// Runs programs from the system `PATH`.
///
/// Applies:
/// - `GIT_TERMINAL_PROMPT=0` - a rejected credential fails instead of prompting
/// - stdin closed
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[Arg]) -> io::Result<ProcessOutput> {
        let executable = resolve_executable(program)?;
        log::debug!("Running {} {}", executable.display(), render_args(args));

        let output = Command::new(&executable)
            .args(args.iter().map(Arg::expose))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Resolve a program name to an absolute executable path.
///
/// Only absolute `PATH` entries are searched, so a relative entry such as `.`
/// can never pick up a binary from the current directory. A program given as a
/// path must be absolute.
pub fn resolve_executable(program: &str) -> io::Result<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        if as_path.is_absolute() {
            return Ok(as_path.to_path_buf());
        }
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to run relative program path {program}"),
        ));
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    let absolute_entries: Vec<PathBuf> = env::split_paths(&search_path)
        .filter(|entry| entry.is_absolute())
        .collect();
    let search_path = env::join_paths(absolute_entries)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let resolved = which::which_in(program, Some(search_path), "/")
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("{program}: {e}")))?;

    if !resolved.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{program} resolved to relative path {}", resolved.display()),
        ));
    }
    Ok(resolved)
}
