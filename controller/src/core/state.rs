//! Controller states and the HOME continuation.

use std::fmt;

use thiserror::Error;

/// Closed set of controller states. Every state has an entry in the
/// transition table, so an unknown state cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Move,
    Home,
    CheckPosition,
    Cut,
    CheckCut,
}

impl State {
    pub const ALL: [State; 5] = [
        State::Move,
        State::Home,
        State::CheckPosition,
        State::Cut,
        State::CheckCut,
    ];

    pub fn name(self) -> &'static str {
        match self {
            State::Move => "MOVE",
            State::Home => "HOME",
            State::CheckPosition => "CHECK_POSITION",
            State::Cut => "CUT",
            State::CheckCut => "CHECK_CUT",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The state to resume once the shared HOME state completes.
///
/// Set exactly once on every transition into HOME, taken exactly once when
/// HOME is left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Continuation(Option<State>);

impl Continuation {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn resume_at(state: State) -> Self {
        Self(Some(state))
    }

    pub fn get(self) -> Option<State> {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }

    /// Remove and return the resume target, leaving the continuation empty.
    pub fn take(&mut self) -> Option<State> {
        self.0.take()
    }
}

impl fmt::Display for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(state) => f.write_str(state.name()),
            None => f.write_str("-"),
        }
    }
}

/// Fatal internal invariant breaches. Never recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("HOME entered with no continuation recorded")]
    HomeWithoutContinuation,
    #[error("continuation {continuation} set while in {state}")]
    StrayContinuation { state: State, continuation: State },
}

/// Continuation must be non-empty exactly when the current state is HOME.
pub fn check_continuation(state: State, continuation: Continuation) -> Result<(), InvariantViolation> {
    match (state, continuation.get()) {
        (State::Home, None) => Err(InvariantViolation::HomeWithoutContinuation),
        (State::Home, Some(_)) => Ok(()),
        (_, Some(target)) => Err(InvariantViolation::StrayContinuation {
            state,
            continuation: target,
        }),
        (_, None) => Ok(()),
    }
}
