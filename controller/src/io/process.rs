//! Bounded execution of external commands.
//!
//! Every launch gets its own process group so that a timeout or shutdown can
//! terminate the whole tree (e.g. `conda run` and the python it spawns) and
//! release the arm and camera devices before the next command starts.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{CommandSpec, IoMode, ProcessOutcome};
use crate::io::shutdown::Shutdown;

/// Grace period between the termination request and the forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on a single blocking wait, so shutdown requests are noticed.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Outcome of one invocation plus whatever output was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub outcome: ProcessOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl RunResult {
    pub fn without_output(outcome: ProcessOutcome) -> Self {
        Self {
            outcome,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Launches one command and reports a typed outcome. Never fails: launch and
/// wait errors are folded into [`ProcessOutcome`].
pub trait ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> RunResult;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, spec: &CommandSpec) -> RunResult {
        (**self).run(spec)
    }
}

/// Runner backed by real child processes.
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    kill_grace: Duration,
    shutdown: Shutdown,
}

impl SystemProcessRunner {
    pub fn new(kill_grace: Duration, shutdown: Shutdown) -> Self {
        Self {
            kill_grace,
            shutdown,
        }
    }
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_GRACE, Shutdown::new())
    }
}

impl ProcessRunner for SystemProcessRunner {
    #[instrument(skip_all, fields(name = %spec.name, timeout_secs = spec.timeout.as_secs_f64()))]
    fn run(&self, spec: &CommandSpec) -> RunResult {
        info!(args = ?spec.argv, "starting command");
        let result = match self.run_inner(spec) {
            Ok(result) => result,
            Err(err) => {
                error!(err = %format!("{err:#}"), "command could not be run");
                RunResult::without_output(ProcessOutcome::LaunchFailed)
            }
        };
        log_outcome(spec, result.outcome);
        result
    }
}

impl SystemProcessRunner {
    fn run_inner(&self, spec: &CommandSpec) -> Result<RunResult> {
        let (program, args) = spec
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command for {}", spec.name))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        match spec.io {
            IoMode::Inherit => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            IoMode::Capture { .. } => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
        }
        isolate_process_group(&mut cmd);

        debug!("spawning child process");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {program}"))?;

        let readers = match spec.io {
            IoMode::Capture { output_limit_bytes } => {
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| anyhow!("stdout was not piped"))?;
                let stderr = child
                    .stderr
                    .take()
                    .ok_or_else(|| anyhow!("stderr was not piped"))?;
                Some((
                    thread::spawn(move || read_stream_limited(stdout, output_limit_bytes)),
                    thread::spawn(move || read_stream_limited(stderr, output_limit_bytes)),
                ))
            }
            IoMode::Inherit => None,
        };

        let outcome = self.wait_bounded(&mut child, spec.timeout);

        let mut result = RunResult::without_output(outcome);
        if let Some((stdout_handle, stderr_handle)) = readers {
            (result.stdout, result.stdout_truncated) =
                join_output(stdout_handle).context("join stdout")?;
            (result.stderr, result.stderr_truncated) =
                join_output(stderr_handle).context("join stderr")?;
            if result.stdout_truncated > 0 || result.stderr_truncated > 0 {
                warn!(
                    stdout_truncated = result.stdout_truncated,
                    stderr_truncated = result.stderr_truncated,
                    "output truncated"
                );
            }
        }
        Ok(result)
    }

    /// Wait for the child within `timeout`, terminating its process group on
    /// expiry or shutdown. The child is always reaped before returning.
    fn wait_bounded(&self, child: &mut Child, timeout: Duration) -> ProcessOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shutdown.is_requested() {
                warn!("shutdown requested, terminating command");
                terminate_tree(child, self.kill_grace);
                return ProcessOutcome::Interrupted;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(timeout_secs = timeout.as_secs_f64(), "command timed out, terminating");
                terminate_tree(child, self.kill_grace);
                return ProcessOutcome::TimedOut;
            }
            match child.wait_timeout(remaining.min(WAIT_SLICE)) {
                Ok(Some(status)) => {
                    // A leftover descendant would keep the capture pipes and
                    // the devices open past the budget.
                    sweep_group(child);
                    return classify_exit(status);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(err = %err, "wait for command failed, terminating");
                    terminate_tree(child, self.kill_grace);
                    return ProcessOutcome::FailedExit(None);
                }
            }
        }
    }
}

fn classify_exit(status: ExitStatus) -> ProcessOutcome {
    if status.success() {
        ProcessOutcome::Succeeded
    } else {
        ProcessOutcome::FailedExit(status.code())
    }
}

fn log_outcome(spec: &CommandSpec, outcome: ProcessOutcome) {
    let timeout_secs = spec.timeout.as_secs_f64();
    match outcome {
        ProcessOutcome::Succeeded => {
            info!(name = %spec.name, args = ?spec.argv, timeout_secs, %outcome, "command finished");
        }
        ProcessOutcome::LaunchFailed | ProcessOutcome::FailedExit(_) => {
            error!(name = %spec.name, args = ?spec.argv, timeout_secs, %outcome, "command finished");
        }
        ProcessOutcome::TimedOut | ProcessOutcome::Interrupted => {
            warn!(name = %spec.name, args = ?spec.argv, timeout_secs, %outcome, "command finished");
        }
    }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

/// Ask the whole process group to stop, escalate to SIGKILL after `grace`,
/// then reap the leader.
#[cfg(unix)]
fn terminate_tree(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        terminate_leader(child);
        return;
    };
    let group = Pid::from_raw(raw);

    if let Err(err) = killpg(group, Signal::SIGTERM) {
        debug!(err = %err, "SIGTERM to process group failed");
    }
    match child.wait_timeout(grace) {
        Ok(Some(status)) => debug!(exit_code = ?status.code(), "command exited after SIGTERM"),
        Ok(None) => warn!(grace_ms = grace.as_millis(), "command ignored SIGTERM, killing"),
        Err(err) => warn!(err = %err, "wait after SIGTERM failed"),
    }
    // Descendants may outlive the leader; sweep the group regardless.
    sweep_group(child);
    if let Err(err) = child.wait() {
        warn!(err = %err, "reap after kill failed");
    }
}

#[cfg(not(unix))]
fn terminate_tree(child: &mut Child, _grace: Duration) {
    terminate_leader(child);
}

/// SIGKILL whatever is left in the child's process group. The group usually
/// no longer exists after a clean exit, which is not an error.
#[cfg(unix)]
fn sweep_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!("killed leftover processes in command group"),
        Err(Errno::ESRCH) => {}
        Err(err) => debug!(err = %err, "SIGKILL to process group failed"),
    }
}

#[cfg(not(unix))]
fn sweep_group(_child: &Child) {}

fn terminate_leader(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(err = %err, "kill failed");
    }
    if let Err(err) = child.wait() {
        warn!(err = %err, "reap after kill failed");
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
