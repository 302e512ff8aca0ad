//! Local process execution.
//!
//! Commands run to completion with stdout and stderr collected. A
//! [`CancellationToken`] kills the child if the run is aborted.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Combined output and exit status of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// stdout followed by stderr
    pub output: String,
    pub status: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs shell command lines on the local host.
pub trait CommandRunner {
    /// Run `command` with `sh -c` and return its output. A non-zero exit is not an error.
    fn run(&self, command: &str) -> Result<ExecOutput>;
}

/// [`CommandRunner`] backed by `sh -c`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    cancel: CancellationToken,
}

impl SystemRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &str) -> Result<ExecOutput> {
        debug!(command, "running local command");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        match run_cancellable(cmd, None, &self.cancel) {
            Ok(finished) => Ok(ExecOutput {
                output: finished.combined(),
                // killed by a signal
                status: finished.status.code().unwrap_or(-1),
            }),
            Err(RunError::Cancelled) => Err(Error::Cancelled),
            Err(RunError::Spawn(e)) | Err(RunError::Io(e)) => Err(Error::Io(e)),
        }
    }
}

/// Raw result of [`run_cancellable`].
#[derive(Debug)]
pub(crate) struct Finished {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
}

impl Finished {
    pub fn combined(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&self.stderr));
        out
    }
}

#[derive(Debug)]
pub(crate) enum RunError {
    Spawn(std::io::Error),
    Io(std::io::Error),
    Cancelled,
}

/// Spawn `cmd`, feed it `stdin`, and wait for it unless `cancel` fires first.
pub(crate) fn run_cancellable(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    cancel: &CancellationToken,
) -> std::result::Result<Finished, RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(RunError::Spawn)?;

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // The child may never read; a blocked write must not stall the wait loop.
        thread::spawn(move || {
            let _ = pipe.write_all(&bytes);
        });
    }

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait(&mut child, cancel) {
        Ok(status) => status,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };

    Ok(Finished {
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        status,
    })
}

fn wait(
    child: &mut Child,
    cancel: &CancellationToken,
) -> std::result::Result<ExitStatus, RunError> {
    loop {
        if let Some(status) = child.try_wait().map_err(RunError::Io)? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        thread::sleep(WAIT_SLICE);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Whether `tool` resolves to an executable on `PATH` (or is an existing path).
pub fn tool_on_path(tool: &str) -> bool {
    if tool.contains('/') {
        return std::path::Path::new(tool).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file()))
        .unwrap_or(false)
}
