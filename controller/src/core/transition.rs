//! Flat transition table for the cutting loop.
//!
//! The table is pure: given the current state, the continuation and what the
//! state's action observed, it yields the next position. HOME is a shared hub
//! whose successor lives in the continuation, not in nested control flow.

use crate::core::state::{Continuation, InvariantViolation, State};
use crate::core::types::ProcessOutcome;

/// Which perception model a judgment state consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Position,
    Cut,
}

/// Work performed by a state before its transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RunMove,
    RunHome,
    RunCut,
    Ask(Judgment),
}

pub fn action_for(state: State) -> Action {
    match state {
        State::Move => Action::RunMove,
        State::Home => Action::RunHome,
        State::CheckPosition => Action::Ask(Judgment::Position),
        State::Cut => Action::RunCut,
        State::CheckCut => Action::Ask(Judgment::Cut),
    }
}

/// What a state's action produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Action(ProcessOutcome),
    Verdict(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    State(State),
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Next,
    pub continuation: Continuation,
}

impl Transition {
    fn to(state: State) -> Self {
        Self {
            next: Next::State(state),
            continuation: Continuation::empty(),
        }
    }

    fn home_then(resume: State) -> Self {
        Self {
            next: Next::State(State::Home),
            continuation: Continuation::resume_at(resume),
        }
    }
}

/// Apply the transition table.
///
/// MOVE and CUT ignore their process outcome: the following perception check
/// re-verifies the scene. A judgment state that observes a process outcome
/// instead of a verdict reads it as `false`, so every pair is defined.
pub fn transition(
    state: State,
    mut continuation: Continuation,
    observation: Observation,
) -> Result<Transition, InvariantViolation> {
    let transition = match state {
        State::Move => Transition::home_then(State::CheckPosition),
        State::Cut => Transition::home_then(State::CheckCut),
        State::Home => {
            let resume = continuation
                .take()
                .ok_or(InvariantViolation::HomeWithoutContinuation)?;
            Transition::to(resume)
        }
        State::CheckPosition => {
            if verdict_of(observation) {
                Transition::to(State::Cut)
            } else {
                Transition::to(State::Move)
            }
        }
        State::CheckCut => {
            if verdict_of(observation) {
                Transition {
                    next: Next::Success,
                    continuation: Continuation::empty(),
                }
            } else {
                Transition::to(State::CheckPosition)
            }
        }
    };
    Ok(transition)
}

fn verdict_of(observation: Observation) -> bool {
    match observation {
        Observation::Verdict(verdict) => verdict,
        Observation::Action(_) => false,
    }
}
