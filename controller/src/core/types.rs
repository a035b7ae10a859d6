//! Shared deterministic types for the controller core.
//!
//! These types define the contracts between the state machine and the
//! process/perception adapters. They hold no handles to external state.

use std::fmt;
use std::time::Duration;

use crate::core::state::InvariantViolation;

/// How a launched command's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Pass-through to the controller's own stdio (live rendering for actuation).
    Inherit,
    /// Stdout and stderr are captured, bounded by the given byte limit.
    Capture { output_limit_bytes: usize },
}

/// One external command to launch: argv, wall-clock budget and a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub io: IoMode,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            argv,
            timeout,
            io: IoMode::Inherit,
        }
    }

    pub fn captured(mut self, output_limit_bytes: usize) -> Self {
        self.io = IoMode::Capture { output_limit_bytes };
        self
    }
}

/// Typed result of one bounded external invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded,
    /// Nonzero exit. `None` when the process was ended by a signal.
    FailedExit(Option<i32>),
    /// The budget expired and the process group was terminated.
    TimedOut,
    /// The command could not be started.
    LaunchFailed,
    /// An out-of-band shutdown request terminated the process group.
    Interrupted,
}

impl ProcessOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::FailedExit(Some(code)) => write!(f, "failed_exit({code})"),
            Self::FailedExit(None) => f.write_str("failed_exit(signal)"),
            Self::TimedOut => f.write_str("timed_out"),
            Self::LaunchFailed => f.write_str("launch_failed"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Tri-state reading of a perception command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerceptionReading {
    Yes,
    No,
    /// Anything that is not a clean "yes"/"no": bad token, empty output,
    /// nonzero exit, timeout, launch failure.
    Indeterminate(String),
}

impl PerceptionReading {
    /// Fail-safe-false: only an explicit "yes" authorizes progress.
    pub fn verdict(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Why a run ended without confirmed success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    IterationBoundExceeded { max_iterations: u32 },
    InvariantViolation(InvariantViolation),
    LaunchFailuresExceeded { consecutive: u32 },
    Interrupted,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationBoundExceeded { max_iterations } => {
                write!(f, "iteration bound exceeded (max_iterations={max_iterations})")
            }
            Self::InvariantViolation(violation) => write!(f, "invariant violation: {violation}"),
            Self::LaunchFailuresExceeded { consecutive } => {
                write!(f, "{consecutive} consecutive actuation launch failures")
            }
            Self::Interrupted => f.write_str("interrupted by shutdown request"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Succeeded,
    Aborted(AbortReason),
}

/// Per-run counters collected by the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub moves: u32,
    pub cuts: u32,
    pub homes: u32,
    pub perception_calls: u32,
}

/// Summary of one controller run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub termination: Termination,
    /// Loop cycles whose body executed.
    pub iterations: u32,
    pub counts: RunCounts,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.termination == Termination::Succeeded
    }
}
