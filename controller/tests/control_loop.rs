//! Scenario tests for the control loop, driven by scripted runner/oracle doubles.
//!
//! Each test scripts the perception verdicts and actuation outcomes, runs a
//! fresh `StateMachine` to termination and checks the visited states and the
//! number of invocations per command.

use controller::core::state::{Continuation, InvariantViolation, State, check_continuation};
use controller::core::transition::Next;
use controller::core::types::{AbortReason, PerceptionReading, ProcessOutcome, Termination};
use controller::machine::{Cycle, StateMachine};
use controller::test_support::{CUT_MODEL, POSITION_MODEL, ScriptedOracle, ScriptedRunner, settings};

use PerceptionReading::{No, Yes};

fn visited(cycles: &[Cycle]) -> Vec<State> {
    cycles.iter().map(|cycle| cycle.from).collect()
}

/// Scenario A: both checks pass first time.
///
/// MOVE → HOME → CHECK_POSITION → CUT → HOME → CHECK_CUT → success.
#[test]
fn first_attempt_success() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
    let oracle = ScriptedOracle::new()
        .answers(POSITION_MODEL, [Yes])
        .answers(CUT_MODEL, [Yes]);

    let mut cycles = Vec::new();
    let report = StateMachine::new(&runner, &oracle, settings(50)).run_with(|c| cycles.push(*c));

    assert_eq!(report.termination, Termination::Succeeded);
    assert_eq!(
        visited(&cycles),
        vec![
            State::Move,
            State::Home,
            State::CheckPosition,
            State::Cut,
            State::Home,
            State::CheckCut,
        ]
    );
    assert_eq!(runner.count("Move"), 1);
    assert_eq!(runner.count("Cut"), 1);
    assert_eq!(runner.count("Home"), 2);
    assert_eq!(oracle.asked().len(), 2);
    assert_eq!(report.iterations, 6);
    assert_eq!(report.counts.perception_calls, 2);
}

/// Scenario B: position rejected once, then accepted.
#[test]
fn rejected_position_triggers_one_extra_move_cycle() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
    let oracle = ScriptedOracle::new()
        .answers(POSITION_MODEL, [No, Yes])
        .answers(CUT_MODEL, [Yes]);

    let mut cycles = Vec::new();
    let report = StateMachine::new(&runner, &oracle, settings(50)).run_with(|c| cycles.push(*c));

    assert!(report.succeeded());
    assert_eq!(
        visited(&cycles),
        vec![
            State::Move,
            State::Home,
            State::CheckPosition,
            State::Move,
            State::Home,
            State::CheckPosition,
            State::Cut,
            State::Home,
            State::CheckCut,
        ]
    );
    assert_eq!(runner.count("Move"), 2);
    assert_eq!(runner.count("Cut"), 1);
    assert_eq!(runner.names(), vec!["Move", "Home", "Move", "Home", "Cut", "Home"]);
}

/// Scenario C: failed cut check goes back to CHECK_POSITION, which must ask again.
#[test]
fn failed_cut_check_requeries_position() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
    let oracle = ScriptedOracle::new()
        .answers(POSITION_MODEL, [Yes, Yes])
        .answers(CUT_MODEL, [No, Yes]);

    let mut cycles = Vec::new();
    let report = StateMachine::new(&runner, &oracle, settings(50)).run_with(|c| cycles.push(*c));

    assert!(report.succeeded());
    assert_eq!(
        oracle.asked(),
        vec![POSITION_MODEL, CUT_MODEL, POSITION_MODEL, CUT_MODEL]
    );
    let after_failed_cut = cycles
        .iter()
        .position(|c| c.from == State::CheckCut)
        .expect("cut check ran");
    assert_eq!(cycles[after_failed_cut].next, Next::State(State::CheckPosition));
    assert_eq!(cycles[after_failed_cut + 1].from, State::CheckPosition);
    assert_eq!(runner.count("Cut"), 2);
    assert_eq!(runner.count("Move"), 1);
}

/// Scenario D (scripted): a timed-out cut still proceeds to HOME.
#[test]
fn timed_out_cut_still_goes_home() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded)
        .outcomes("Cut", [ProcessOutcome::TimedOut]);
    let oracle = ScriptedOracle::new()
        .answers(POSITION_MODEL, [Yes])
        .answers(CUT_MODEL, [Yes]);

    let mut cycles = Vec::new();
    let report = StateMachine::new(&runner, &oracle, settings(50)).run_with(|c| cycles.push(*c));

    let cut = cycles.iter().find(|c| c.from == State::Cut).expect("cut ran");
    assert_eq!(cut.next, Next::State(State::Home));
    assert_eq!(cut.continuation, Continuation::resume_at(State::CheckCut));
    assert!(report.succeeded());
}

/// Scenario E: HOME with no continuation aborts before any command runs.
#[test]
fn home_without_continuation_aborts_immediately() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
    let oracle = ScriptedOracle::new();

    let report = StateMachine::new(&runner, &oracle, settings(50))
        .starting_at(State::Home, Continuation::empty())
        .run();

    assert_eq!(
        report.termination,
        Termination::Aborted(AbortReason::InvariantViolation(
            InvariantViolation::HomeWithoutContinuation
        ))
    );
    assert!(runner.invocations().is_empty());
    assert!(oracle.asked().is_empty());
    assert_eq!(report.iterations, 1);
}

/// Position never accepted: the run aborts after exactly `max_iterations` cycles.
#[test]
fn never_accepted_position_hits_iteration_bound_exactly() {
    for max_iterations in [1, 2, 3, 7, 50] {
        let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
        let oracle = ScriptedOracle::new();

        let mut cycles = Vec::new();
        let report = StateMachine::new(&runner, &oracle, settings(max_iterations))
            .run_with(|c| cycles.push(*c));

        assert_eq!(
            report.termination,
            Termination::Aborted(AbortReason::IterationBoundExceeded { max_iterations })
        );
        assert_eq!(report.iterations, max_iterations);
        assert_eq!(cycles.len() as u32, max_iterations);
        let iterations: Vec<u32> = cycles.iter().map(|c| c.iteration).collect();
        assert_eq!(iterations, (1..=max_iterations).collect::<Vec<_>>());
        assert_eq!(runner.count("Cut"), 0);
    }
}

/// Indeterminate perception never authorizes a cut.
#[test]
fn indeterminate_position_is_treated_as_no() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
    let oracle = ScriptedOracle::new().answers(
        POSITION_MODEL,
        [
            PerceptionReading::Indeterminate("unexpected token 'maybe'".to_string()),
            PerceptionReading::Indeterminate("classifier timed_out".to_string()),
        ],
    );

    let report = StateMachine::new(&runner, &oracle, settings(6)).run();

    assert!(!report.succeeded());
    assert_eq!(runner.count("Cut"), 0);
    assert_eq!(runner.count("Move"), 2);
}

/// Continuation is set exactly while in HOME along every reachable path.
#[test]
fn continuation_invariant_holds_on_mixed_run() {
    let runner = ScriptedRunner::always(ProcessOutcome::FailedExit(Some(1)))
        .outcomes("Move", [ProcessOutcome::LaunchFailed, ProcessOutcome::TimedOut]);
    let oracle = ScriptedOracle::new()
        .answers(POSITION_MODEL, [No, Yes, Yes, No, Yes])
        .answers(CUT_MODEL, [No, No, Yes]);

    let mut cycles = Vec::new();
    let report = StateMachine::new(&runner, &oracle, settings(50)).run_with(|c| cycles.push(*c));

    assert!(report.succeeded());
    for cycle in &cycles {
        if let Next::State(next) = cycle.next {
            assert!(
                check_continuation(next, cycle.continuation).is_ok(),
                "iteration {}: {} -> {} with continuation {}",
                cycle.iteration,
                cycle.from,
                next,
                cycle.continuation
            );
        }
    }
    let homes = cycles.iter().filter(|c| c.from == State::Home).count();
    assert_eq!(homes, runner.count("Home"));
}

/// MOVE and CUT get distinct run identifiers on every invocation.
#[test]
fn recording_commands_get_fresh_run_ids() {
    let runner = ScriptedRunner::always(ProcessOutcome::Succeeded);
    let oracle = ScriptedOracle::new()
        .answers(POSITION_MODEL, [No, No, Yes])
        .answers(CUT_MODEL, [Yes]);

    StateMachine::new(&runner, &oracle, settings(50)).run();

    let run_ids: Vec<String> = runner
        .invocations()
        .into_iter()
        .filter(|spec| spec.name != "Home")
        .filter_map(|spec| spec.argv.last().cloned())
        .collect();
    assert_eq!(run_ids.len(), 4);
    let unique: std::collections::HashSet<&String> = run_ids.iter().collect();
    assert_eq!(unique.len(), run_ids.len());
    assert!(run_ids.iter().all(|id| id.starts_with("--run-id=test_")));
}
