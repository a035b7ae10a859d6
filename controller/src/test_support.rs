//! Test-only doubles for the process runner and the perception oracle.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::catalog::CommandCatalog;
use crate::core::types::{CommandSpec, PerceptionReading, ProcessOutcome};
use crate::io::config::{ActionConfig, HomeConfig};
use crate::io::oracle::PerceptionOracle;
use crate::io::process::{ProcessRunner, RunResult};
use crate::machine::{ActuationPolicy, MachineSettings};

pub const POSITION_MODEL: &str = "position.pt";
pub const CUT_MODEL: &str = "cut.pt";

/// Settings with short fake commands (`move`, `cut`, `home`) and fixed model ids.
pub fn settings(max_iterations: u32) -> MachineSettings {
    let action = |program: &str| ActionConfig {
        command: vec![program.to_string()],
        timeout_secs: 30,
        run_id_arg: "--run-id=".to_string(),
        run_id_prefix: "test".to_string(),
    };
    MachineSettings {
        max_iterations,
        policy: ActuationPolicy::IgnoreOutcome,
        position_model: POSITION_MODEL.to_string(),
        cut_model: CUT_MODEL.to_string(),
        catalog: CommandCatalog::new(
            action("move"),
            action("cut"),
            HomeConfig {
                command: vec!["home".to_string()],
                timeout_secs: 5,
            },
        ),
    }
}

/// Runner that returns scripted outcomes per command name and records every call.
#[derive(Debug)]
pub struct ScriptedRunner {
    fallback: ProcessOutcome,
    scripted: RefCell<HashMap<String, VecDeque<ProcessOutcome>>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn always(outcome: ProcessOutcome) -> Self {
        Self {
            fallback: outcome,
            scripted: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Queue outcomes for the command named `name` (`Move`, `Cut`, `Home`);
    /// once exhausted, the fallback outcome is used.
    pub fn outcomes<I: IntoIterator<Item = ProcessOutcome>>(self, name: &str, outcomes: I) -> Self {
        self.scripted
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|spec| spec.name == name).count()
    }

    pub fn names(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|spec| spec.name.clone()).collect()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> RunResult {
        self.calls.borrow_mut().push(spec.clone());
        let outcome = self
            .scripted
            .borrow_mut()
            .get_mut(&spec.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback);
        RunResult::without_output(outcome)
    }
}

/// Oracle answering from per-model queues; exhausted queues answer `No`.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: RefCell<HashMap<String, VecDeque<PerceptionReading>>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answers<I: IntoIterator<Item = PerceptionReading>>(self, model: &str, answers: I) -> Self {
        self.answers
            .borrow_mut()
            .entry(model.to_string())
            .or_default()
            .extend(answers);
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl PerceptionOracle for ScriptedOracle {
    fn ask(&self, model_id: &str) -> PerceptionReading {
        self.asked.borrow_mut().push(model_id.to_string());
        self.answers
            .borrow_mut()
            .get_mut(model_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PerceptionReading::No)
    }
}

/// A command spec for a shell snippet, used by process tests.
pub fn shell(name: &str, script: &str, timeout: Duration) -> CommandSpec {
    CommandSpec::new(
        name,
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        timeout,
    )
}
