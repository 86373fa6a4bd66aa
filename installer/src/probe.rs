//! Post-install smoke test for the installed binary.
//!
//! The probe runs the freshly installed executable with its help flag and
//! looks for a marker string in the combined stdout and stderr. A failed
//! probe never undoes the install; the pipeline reports it as a warning.

use log::debug;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use wait_timeout::ChildExt;

/// Marker printed by `ga --help`.
pub const DEFAULT_PROBE_MARKER: &str = "Git Assistant";

/// `ETXTBSY`: the executable is still open for writing somewhere.
const TEXT_FILE_BUSY: i32 = 26;

/// Attempts made when the kernel reports the fresh executable as busy.
const SPAWN_ATTEMPTS: u32 = 5;

/// How the installed binary is exercised after install.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSpec {
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Substring that must appear in the combined output.
    pub marker: String,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            args: vec!["--help".to_owned()],
            marker: DEFAULT_PROBE_MARKER.to_owned(),
        }
    }
}

/// Captured result of one probe run.
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    /// How the process exited.
    pub status: ExitStatus,
    /// Stdout followed by stderr, lossily decoded.
    pub combined: String,
}

/// Reasons the installed binary could not be confirmed functional.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The binary could not be started.
    #[error("failed to run installed binary: {0}")]
    Spawn(#[source] std::io::Error),

    /// The binary, or a process holding its output, outlived the time budget.
    #[error("installed binary did not exit within {} seconds", .0.as_secs())]
    TimedOut(Duration),

    /// The binary exited unsuccessfully.
    #[error("installed binary exited with {status}")]
    ExitStatus {
        /// The observed exit status.
        status: ExitStatus,
    },

    /// The output did not contain the expected marker.
    #[error("installed binary output did not contain \"{marker}\"")]
    MarkerMissing {
        /// The marker that was expected.
        marker: String,
    },
}

/// Abstraction for running the installed binary, so tests can script
/// outcomes without spawning processes.
#[cfg_attr(test, mockall::automock)]
pub trait ProbeRunner {
    /// Run `program` with `args`, killing it after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Spawn`] if the process cannot start or its
    /// output cannot be collected, and [`ProbeError::TimedOut`] if it does
    /// not exit in time.
    fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProbeOutput, ProbeError>;
}

/// Runs the probe as a real child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbeRunner;

impl ProbeRunner for SystemProbeRunner {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProbeOutput, ProbeError> {
        let deadline = Instant::now() + timeout;
        let mut child = spawn_with_retry(program, args)?;

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait for it to exit.
        let (sender, receiver) = mpsc::channel();
        if let Some(pipe) = child.stdout.take() {
            spawn_reader(Pipe::Stdout, pipe, sender.clone());
        }
        if let Some(pipe) = child.stderr.take() {
            spawn_reader(Pipe::Stderr, pipe, sender.clone());
        }
        drop(sender);

        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some(status) = child.wait_timeout(remaining).map_err(ProbeError::Spawn)? else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProbeError::TimedOut(timeout));
        };

        // A background process spawned by the binary may still hold the
        // pipes open after the binary itself has exited.
        let (stdout, stderr) =
            collect_output(&receiver, deadline).ok_or(ProbeError::TimedOut(timeout))?;
        Ok(ProbeOutput {
            status,
            combined: stdout + &stderr,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

fn spawn_with_retry(program: &Path, args: &[String]) -> Result<std::process::Child, ProbeError> {
    let mut attempt = 1;
    loop {
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match spawned {
            Ok(child) => return Ok(child),
            Err(err) if err.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < SPAWN_ATTEMPTS => {
                debug!("{} busy on attempt {attempt}; retrying", program.display());
                attempt += 1;
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => return Err(ProbeError::Spawn(err)),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    which: Pipe,
    mut pipe: R,
    sender: Sender<(Pipe, String)>,
) {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        let _ = sender.send((which, String::from_utf8_lossy(&buffer).into_owned()));
    });
}

/// Wait for both readers until `deadline`. `None` when time runs out first.
fn collect_output(
    receiver: &Receiver<(Pipe, String)>,
    deadline: Instant,
) -> Option<(String, String)> {
    let mut stdout = String::new();
    let mut stderr = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok((Pipe::Stdout, text)) => stdout = text,
            Ok((Pipe::Stderr, text)) => stderr = text,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Some((stdout, stderr)),
            Err(mpsc::RecvTimeoutError::Timeout) => return None,
        }
    }
}

/// Run the probe against an installed binary and check its output.
///
/// # Errors
///
/// Returns a [`ProbeError`] describing why the binary could not be
/// confirmed functional.
pub fn probe_binary(
    runner: &dyn ProbeRunner,
    program: &Path,
    spec: &ProbeSpec,
    timeout: Duration,
) -> Result<(), ProbeError> {
    if timeout.is_zero() {
        return Err(ProbeError::TimedOut(timeout));
    }
    let output = runner.run(program, &spec.args, timeout)?;
    if !output.status.success() {
        return Err(ProbeError::ExitStatus {
            status: output.status,
        });
    }
    if !output.combined.contains(&spec.marker) {
        return Err(ProbeError::MarkerMissing {
            marker: spec.marker.clone(),
        });
    }
    debug!("probe of {} found marker \"{}\"", program.display(), spec.marker);
    Ok(())
}
