//! Closed-loop task controller for a bimanual cutting task.
//!
//! The controller sequences long-running actuation commands (move the object,
//! cut it, return the arm home) with single-shot perception commands that
//! judge progress, until the cut is confirmed or a safety bound trips.
//!
//! - **[`core`]**: Pure, deterministic logic (states, transition table,
//!   verdict parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (child processes, the classifier
//!   command, config files, shutdown signal).
//!
//! [`machine`] wires the two together; [`catalog`] builds actuation commands.

pub mod catalog;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod machine;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
