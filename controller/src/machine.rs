//! Closed-loop controller for the cutting task.
//!
//! One `StateMachine` drives one run: it executes the current state's action
//! or perception query, applies the flat transition table and repeats until
//! CHECK_CUT confirms success or the run aborts. Everything is sequential; the
//! only suspension points are the blocking runner and oracle calls.

use tracing::{error, info, warn};

use crate::catalog::{CommandCatalog, RunStamper};
use crate::core::state::{Continuation, State, check_continuation};
use crate::core::transition::{Action, Judgment, Next, Observation, action_for, transition};
use crate::core::types::{
    AbortReason, CommandSpec, ProcessOutcome, RunCounts, RunReport, Termination,
};
use crate::io::config::ControllerConfig;
use crate::io::oracle::PerceptionOracle;
use crate::io::process::ProcessRunner;
use crate::io::shutdown::Shutdown;

/// How MOVE/CUT outcomes feed back into control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuationPolicy {
    /// Always proceed to HOME; the next perception check re-verifies.
    #[default]
    IgnoreOutcome,
    /// As `IgnoreOutcome`, but abort once this many MOVE/CUT launches fail in a row.
    EscalateLaunchFailures { limit: u32 },
}

impl ActuationPolicy {
    pub fn from_limit(limit: Option<u32>) -> Self {
        match limit {
            Some(limit) => Self::EscalateLaunchFailures { limit },
            None => Self::IgnoreOutcome,
        }
    }
}

/// Static knobs for one run.
#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub max_iterations: u32,
    pub policy: ActuationPolicy,
    pub position_model: String,
    pub cut_model: String,
    pub catalog: CommandCatalog,
}

impl MachineSettings {
    pub fn from_config(cfg: &ControllerConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            policy: ActuationPolicy::from_limit(cfg.launch_failure_limit),
            position_model: cfg.perception.position_model.clone(),
            cut_model: cfg.perception.cut_model.clone(),
            catalog: CommandCatalog::from_config(cfg),
        }
    }
}

/// One executed loop cycle, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub iteration: u32,
    pub from: State,
    pub observation: Observation,
    pub next: Next,
    pub continuation: Continuation,
}

pub struct StateMachine<R, O> {
    runner: R,
    oracle: O,
    settings: MachineSettings,
    shutdown: Shutdown,
    stamper: RunStamper,
    state: State,
    continuation: Continuation,
    iteration: u32,
    cycles_run: u32,
    consecutive_launch_failures: u32,
    counts: RunCounts,
}

impl<R: ProcessRunner, O: PerceptionOracle> StateMachine<R, O> {
    pub fn new(runner: R, oracle: O, settings: MachineSettings) -> Self {
        Self {
            runner,
            oracle,
            settings,
            shutdown: Shutdown::new(),
            stamper: RunStamper::new(),
            state: State::Move,
            continuation: Continuation::empty(),
            iteration: 0,
            cycles_run: 0,
            consecutive_launch_failures: 0,
            counts: RunCounts::default(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Start from an arbitrary position instead of MOVE with no continuation.
    pub fn starting_at(mut self, state: State, continuation: Continuation) -> Self {
        self.state = state;
        self.continuation = continuation;
        self
    }

    pub fn run(self) -> RunReport {
        self.run_with(|_| {})
    }

    /// Drive the loop to termination, calling `on_cycle` after every
    /// executed cycle that produced a transition.
    pub fn run_with<F: FnMut(&Cycle)>(mut self, mut on_cycle: F) -> RunReport {
        info!(
            max_iterations = self.settings.max_iterations,
            state = %self.state,
            "starting cutting state machine"
        );

        let termination = loop {
            if self.shutdown.is_requested() {
                warn!(iteration = self.iteration, "shutdown requested, aborting run");
                break Termination::Aborted(AbortReason::Interrupted);
            }

            self.iteration += 1;
            if self.iteration > self.settings.max_iterations {
                error!(
                    max_iterations = self.settings.max_iterations,
                    "reached max iterations, aborting for safety"
                );
                break Termination::Aborted(AbortReason::IterationBoundExceeded {
                    max_iterations: self.settings.max_iterations,
                });
            }
            self.cycles_run += 1;

            info!(
                iteration = self.iteration,
                state = %self.state,
                continuation = %self.continuation,
                "cycle"
            );

            match self.step() {
                Ok(cycle) => {
                    on_cycle(&cycle);
                    if cycle.next == Next::Success {
                        info!(iteration = self.iteration, "cut confirmed, run succeeded");
                        break Termination::Succeeded;
                    }
                }
                Err(reason) => {
                    error!(iteration = self.iteration, state = %self.state, %reason, "aborting run");
                    break Termination::Aborted(reason);
                }
            }
        };

        let report = RunReport {
            termination,
            iterations: self.cycles_run,
            counts: self.counts,
        };
        info!(
            iterations = report.iterations,
            moves = report.counts.moves,
            cuts = report.counts.cuts,
            homes = report.counts.homes,
            perception_calls = report.counts.perception_calls,
            "state machine finished"
        );
        report
    }

    /// Execute the current state's work and apply the transition table.
    fn step(&mut self) -> Result<Cycle, AbortReason> {
        let from = self.state;
        // Checked before acting so a HOME without a resume target never moves the arm.
        check_continuation(from, self.continuation).map_err(AbortReason::InvariantViolation)?;

        let observation = match action_for(from) {
            Action::RunMove => {
                self.counts.moves += 1;
                let spec = self.settings.catalog.build_move(&self.stamper.stamp());
                Observation::Action(self.actuate(&spec)?)
            }
            Action::RunCut => {
                self.counts.cuts += 1;
                let spec = self.settings.catalog.build_cut(&self.stamper.stamp());
                Observation::Action(self.actuate(&spec)?)
            }
            Action::RunHome => {
                self.counts.homes += 1;
                let outcome = self.runner.run(&self.settings.catalog.build_home()).outcome;
                if !outcome.is_success() {
                    warn!(%outcome, "home command did not succeed, continuing");
                }
                Observation::Action(outcome)
            }
            Action::Ask(judgment) => {
                self.counts.perception_calls += 1;
                let model = match judgment {
                    Judgment::Position => &self.settings.position_model,
                    Judgment::Cut => &self.settings.cut_model,
                };
                Observation::Verdict(self.oracle.ask(model).verdict())
            }
        };

        let applied = transition(from, self.continuation, observation)
            .map_err(AbortReason::InvariantViolation)?;
        self.continuation = applied.continuation;
        if let Next::State(next) = applied.next {
            self.state = next;
        }

        let to = match applied.next {
            Next::State(next) => next.name(),
            Next::Success => "SUCCESS",
        };
        info!(
            iteration = self.iteration,
            from = %from,
            to,
            continuation = %self.continuation,
            "transition"
        );

        Ok(Cycle {
            iteration: self.iteration,
            from,
            observation,
            next: applied.next,
            continuation: self.continuation,
        })
    }

    /// Run MOVE or CUT. The outcome never changes the next state, but the
    /// policy may escalate repeated launch failures into an abort.
    fn actuate(&mut self, spec: &CommandSpec) -> Result<ProcessOutcome, AbortReason> {
        let outcome = self.runner.run(spec).outcome;
        if outcome == ProcessOutcome::LaunchFailed {
            self.consecutive_launch_failures += 1;
        } else {
            self.consecutive_launch_failures = 0;
        }

        if let ActuationPolicy::EscalateLaunchFailures { limit } = self.settings.policy
            && self.consecutive_launch_failures >= limit
        {
            return Err(AbortReason::LaunchFailuresExceeded {
                consecutive: self.consecutive_launch_failures,
            });
        }
        if !outcome.is_success() {
            warn!(name = %spec.name, %outcome, "actuation did not succeed, relying on next perception check");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PerceptionReading;
    use crate::test_support::{ScriptedOracle, ScriptedRunner, settings};

    #[test]
    fn happy_path_reports_cycles_to_observer() {
        let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
        let oracle = ScriptedOracle::new()
            .answers("position.pt", [PerceptionReading::Yes])
            .answers("cut.pt", [PerceptionReading::Yes]);

        let mut path = Vec::new();
        let report = StateMachine::new(&runner, &oracle, settings(50))
            .run_with(|cycle| path.push((cycle.from, cycle.next)));

        assert!(report.succeeded());
        assert_eq!(
            path,
            vec![
                (State::Move, Next::State(State::Home)),
                (State::Home, Next::State(State::CheckPosition)),
                (State::CheckPosition, Next::State(State::Cut)),
                (State::Cut, Next::State(State::Home)),
                (State::Home, Next::State(State::CheckCut)),
                (State::CheckCut, Next::Success),
            ]
        );
    }

    #[test]
    fn launch_failures_escalate_when_configured() {
        let runner = ScriptedRunner::always(ProcessOutcome::LaunchFailed);
        let oracle = ScriptedOracle::new();
        let mut cfg = settings(50);
        cfg.policy = ActuationPolicy::EscalateLaunchFailures { limit: 2 };

        let report = StateMachine::new(&runner, &oracle, cfg).run();

        // MOVE (fail) -> HOME -> CHECK_POSITION (no) -> MOVE (fail, 2nd in a row)
        assert_eq!(
            report.termination,
            Termination::Aborted(AbortReason::LaunchFailuresExceeded { consecutive: 2 })
        );
        assert_eq!(report.counts.moves, 2);
        assert_eq!(report.iterations, 4);
    }

    #[test]
    fn launch_failures_are_retried_by_default() {
        let runner = ScriptedRunner::always(ProcessOutcome::LaunchFailed);
        let oracle = ScriptedOracle::new();

        let report = StateMachine::new(&runner, &oracle, settings(9)).run();

        assert_eq!(
            report.termination,
            Termination::Aborted(AbortReason::IterationBoundExceeded { max_iterations: 9 })
        );
        assert_eq!(report.counts.moves, 3);
    }

    #[test]
    fn shutdown_before_first_cycle_runs_nothing() {
        let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
        let oracle = ScriptedOracle::new();
        let shutdown = Shutdown::new();
        shutdown.request();

        let report = StateMachine::new(&runner, &oracle, settings(50))
            .with_shutdown(shutdown)
            .run();

        assert_eq!(report.termination, Termination::Aborted(AbortReason::Interrupted));
        assert_eq!(report.iterations, 0);
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn stray_continuation_outside_home_is_fatal() {
        let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
        let oracle = ScriptedOracle::new();

        let report = StateMachine::new(&runner, &oracle, settings(50))
            .starting_at(State::Cut, Continuation::resume_at(State::CheckCut))
            .run();

        assert!(matches!(
            report.termination,
            Termination::Aborted(AbortReason::InvariantViolation(_))
        ));
        assert!(runner.invocations().is_empty());
    }
}
