//! Perception oracle: one classifier invocation per judgment.
//!
//! The classifier is an external single-shot command that grabs a camera
//! frame and prints `yes` or `no` as its last non-blank stdout line.

use tracing::{info, instrument, warn};

use crate::core::types::{CommandSpec, PerceptionReading, ProcessOutcome};
use crate::core::verdict::parse_reading;
use crate::io::config::PerceptionConfig;
use crate::io::process::ProcessRunner;

/// Binary judgment source consulted by CHECK_POSITION and CHECK_CUT.
pub trait PerceptionOracle {
    fn ask(&self, model_id: &str) -> PerceptionReading;
}

impl<O: PerceptionOracle + ?Sized> PerceptionOracle for &O {
    fn ask(&self, model_id: &str) -> PerceptionReading {
        (**self).ask(model_id)
    }
}

/// Oracle that launches the configured classifier command through a [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct CommandOracle<R> {
    runner: R,
    config: PerceptionConfig,
}

impl<R: ProcessRunner> CommandOracle<R> {
    pub fn new(runner: R, config: PerceptionConfig) -> Self {
        Self { runner, config }
    }

    /// Command for one judgment with `model_id` against the fixed source.
    pub fn query_spec(&self, model_id: &str) -> CommandSpec {
        let mut argv = self.config.command.clone();
        argv.extend([
            self.config.model_arg.clone(),
            model_id.to_string(),
            self.config.source_arg.clone(),
            self.config.source.clone(),
        ]);
        CommandSpec::new("Perception", argv, self.config.timeout())
            .captured(self.config.output_limit_bytes)
    }
}

impl<R: ProcessRunner> PerceptionOracle for CommandOracle<R> {
    #[instrument(skip(self))]
    fn ask(&self, model_id: &str) -> PerceptionReading {
        let result = self.runner.run(&self.query_spec(model_id));

        let raw_stdout = result.stdout_lossy();
        let raw_stderr = result.stderr_lossy();
        info!(
            stdout = raw_stdout.trim(),
            stderr = raw_stderr.trim(),
            outcome = %result.outcome,
            "classifier raw output"
        );

        let reading = match result.outcome {
            ProcessOutcome::Succeeded => parse_reading(&raw_stdout),
            other => PerceptionReading::Indeterminate(format!("classifier {other}")),
        };
        if let PerceptionReading::Indeterminate(reason) = &reading {
            warn!(%reason, "treating perception result as NOT OK");
        }
        info!(reading = ?reading, verdict = reading.verdict(), "perception verdict");
        reading
    }
}
