use std::{
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use derive_more::{Display, Error, From};
use tokio::{process::Command, time::timeout};
use tracing::{debug, instrument};

/// External process errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ProcessError {
    /// IO-related error.
    Io(io::Error),
}

/// Result of probing an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Probe {
    /// Tool exists and exited successfully.
    Available {
        /// Captured standard output.
        stdout: String,
    },

    /// Tool exists, but exited unsuccessfully or didn't finish in time.
    Failed {
        /// Captured standard error.
        stderr: String,
    },

    /// Tool is not present in `PATH`.
    Missing,
}

impl Probe {
    /// Check if the probed tool is installed and usable.
    pub(crate) fn is_available(&self) -> bool {
        matches!(self, Probe::Available { .. })
    }
}

/// Foreground process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    /// Program name or path.
    pub program: String,

    /// Program arguments.
    pub args: Vec<String>,

    /// Additional environment variables.
    pub envs: Vec<(String, String)>,

    /// Working directory of the process.
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Create new [`Invocation`] of the provided `program`.
    pub(crate) fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Append an argument.
    pub(crate) fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable.
    pub(crate) fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub(crate) fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Render the invocation as a shell-like command line.
    pub(crate) fn command_line(&self) -> String {
        let mut line = self.program.clone();

        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }

        line
    }
}

/// Finished foreground process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    /// Exit code, absent if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl Completion {
    /// Check if the process exited successfully.
    pub(crate) fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Check if the process was stopped by an interrupt rather than exiting on its own.
    ///
    /// Shells report processes killed by `SIGINT` with the `130` exit code.
    pub(crate) fn interrupted(&self) -> bool {
        matches!(self.code, None | Some(130))
    }

    /// Human-readable exit status.
    pub(crate) fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => String::from("signal"),
        }
    }
}

impl From<ExitStatus> for Completion {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// External process execution port.
#[async_trait]
pub(crate) trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, capturing its output.
    ///
    /// Missing programs are reported as [`Probe::Missing`] rather than as an error.
    async fn probe(&self, program: &str, args: &[&str]) -> Result<Probe, ProcessError>;

    /// Run a process in the foreground with inherited standard streams
    /// and wait for it to exit.
    async fn run(&self, invocation: &Invocation) -> Result<Completion, ProcessError>;
}

/// [`ProcessRunner`] that spawns real operating system processes.
pub(crate) struct SystemRunner {
    /// Max duration of a single probe.
    probe_timeout: Duration,
}

impl SystemRunner {
    /// Create new [`SystemRunner`] with the provided probe timeout.
    pub(crate) fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    #[instrument(skip(self), err)]
    async fn probe(&self, program: &str, args: &[&str]) -> Result<Probe, ProcessError> {
        let program = match which::which(program) {
            Ok(path) => path,
            Err(error) => {
                debug!(%error, "program not found");
                return Ok(Probe::Missing);
            }
        };

        let child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match timeout(self.probe_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                debug!(timeout = ?self.probe_timeout, "probe timed out");

                return Ok(Probe::Failed {
                    stderr: String::from("timed out"),
                });
            }
        };

        if output.status.success() {
            Ok(Probe::Available {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            })
        } else {
            Ok(Probe::Failed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    #[instrument(skip(self, invocation), fields(command = %invocation.command_line()), err)]
    async fn run(&self, invocation: &Invocation) -> Result<Completion, ProcessError> {
        let mut command = Command::new(&invocation.program);

        command
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let status = command.spawn()?.wait().await?;

        Ok(status.into())
    }
}
