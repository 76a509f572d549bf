//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use crate::process::{Arg, ProcessOutput, ProcessRunner};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    /// Arguments as they would be logged (secrets shown as `***`).
    pub args: Vec<String>,
    /// Raw values of the secret arguments, in order.
    pub secrets: Vec<String>,
}

impl Call {
    pub fn subcommand(&self) -> Option<&str> {
        self.args
            .iter()
            .map(String::as_str)
            .find(|arg| matches!(*arg, "clone" | "checkout" | "--version"))
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failures: HashMap<String, ProcessOutput>,
    clone_delay: Option<Duration>,
}

/// A [`ProcessRunner`] that records every call and simulates git on disk.
///
/// - `clone` creates `<dest>/.git/config` recording the clone URL as the
///   origin remote (as git does) and `<dest>/README`
/// - `checkout` writes the reference into `<work tree>/CHECKED_OUT`
/// - a failing `clone` still leaves a partial `<dest>` behind, like a real
///   clone interrupted half-way
#[derive(Clone, Default)]
pub struct RecordingRunner {
    state: Arc<Mutex<State>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `subcommand` exit with `code` and `stderr`.
    pub fn fail(&self, subcommand: &str, code: i32, stderr: &str) {
        self.state.lock().unwrap().failures.insert(
            subcommand.to_string(),
            ProcessOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: format!("{stderr}\n"),
            },
        );
    }

    /// Sleep for `delay` inside every clone.
    pub fn delay_clones(&self, delay: Duration) {
        self.state.lock().unwrap().clone_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| call.subcommand().map(str::to_string))
            .collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[Arg]) -> io::Result<ProcessOutput> {
        let call = Call {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            secrets: args
                .iter()
                .filter(|arg| arg.is_secret())
                .map(|arg| arg.expose().to_string_lossy().into_owned())
                .collect(),
        };
        let subcommand = call.subcommand().unwrap_or_default().to_string();

        let (failure, clone_delay) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call.clone());
            (state.failures.get(&subcommand).cloned(), state.clone_delay)
        };

        match subcommand.as_str() {
            "clone" => {
                if let Some(delay) = clone_delay {
                    std::thread::sleep(delay);
                }
                let dest = PathBuf::from(call.args.last().cloned().unwrap_or_default());
                std::fs::create_dir_all(dest.join(".git"))?;
                let remote = call.secrets.first().cloned().unwrap_or_default();
                std::fs::write(
                    dest.join(".git").join("config"),
                    format!(
                        "[core]\n\trepositoryformatversion = 0\n[remote \"origin\"]\n\turl = {remote}\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n"
                    ),
                )?;
                if failure.is_none() {
                    std::fs::write(dest.join("README"), "cloned\n")?;
                }
            }
            "checkout" if failure.is_none() => {
                let work_tree = call
                    .args
                    .iter()
                    .find_map(|arg| arg.strip_prefix("--work-tree="))
                    .map(PathBuf::from)
                    .unwrap_or_default();
                let reference = call.args.last().cloned().unwrap_or_default();
                std::fs::write(work_tree.join("CHECKED_OUT"), reference)?;
            }
            _ => {}
        }

        if let Some(failure) = failure {
            return Ok(failure);
        }
        let stdout = if subcommand == "--version" {
            "git version 2.43.0\n".to_string()
        } else {
            String::new()
        };
        Ok(ProcessOutput {
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

/// Collects every log line emitted by any test in this process.
struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let line = format!("{} {}", record.level(), record.args());
        self.lines.lock().unwrap().push(line);
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};

static INSTALL: Once = Once::new();

/// Install the capturing logger (once per process).
pub fn capture_logs() {
    INSTALL.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
}

/// All log lines captured so far.
pub fn captured_logs() -> Vec<String> {
    LOGGER.lines.lock().unwrap().clone()
}
