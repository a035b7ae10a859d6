//! Stable exit codes for controller CLI commands.

use crate::core::types::{AbortReason, Termination};

/// Run confirmed success, or the command completed.
pub const OK: i32 = 0;
/// Invalid config/usage, or another error outside the control loop.
pub const INVALID: i32 = 1;
/// The run hit `max_iterations` without confirming the cut.
pub const ITERATION_BOUND: i32 = 2;
/// An internal invariant broke (e.g. HOME without a continuation).
pub const INVARIANT_VIOLATION: i32 = 3;
/// Too many consecutive MOVE/CUT launch failures.
pub const LAUNCH_FAILURES: i32 = 4;
/// Stopped by SIGINT/SIGTERM.
pub const INTERRUPTED: i32 = 130;

pub fn for_termination(termination: &Termination) -> i32 {
    match termination {
        Termination::Succeeded => OK,
        Termination::Aborted(AbortReason::IterationBoundExceeded { .. }) => ITERATION_BOUND,
        Termination::Aborted(AbortReason::InvariantViolation(_)) => INVARIANT_VIOLATION,
        Termination::Aborted(AbortReason::LaunchFailuresExceeded { .. }) => LAUNCH_FAILURES,
        Termination::Aborted(AbortReason::Interrupted) => INTERRUPTED,
    }
}
