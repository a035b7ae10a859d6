//! Argument sets for the actuation commands.
//!
//! MOVE and CUT launch a recording policy that needs a fresh dataset id per
//! invocation; HOME is static.

use chrono::{DateTime, Local};

use crate::core::types::CommandSpec;
use crate::io::config::{ActionConfig, ControllerConfig, HomeConfig};

/// Issues run identifiers: wall-clock stamp to the millisecond plus a per-run
/// sequence number, so two calls within the same instant still differ.
#[derive(Debug, Default)]
pub struct RunStamper {
    issued: u32,
}

impl RunStamper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp_at(&mut self, now: DateTime<Local>) -> String {
        self.issued += 1;
        format!(
            "{}_{:03}_{}",
            now.format("%Y%m%d_%H%M%S"),
            now.timestamp_subsec_millis().min(999),
            self.issued
        )
    }

    pub fn stamp(&mut self) -> String {
        self.stamp_at(Local::now())
    }
}

/// Pure builders for MOVE, CUT and HOME command specs.
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    move_action: ActionConfig,
    cut: ActionConfig,
    home: HomeConfig,
}

impl CommandCatalog {
    pub fn new(move_action: ActionConfig, cut: ActionConfig, home: HomeConfig) -> Self {
        Self {
            move_action,
            cut,
            home,
        }
    }

    pub fn from_config(cfg: &ControllerConfig) -> Self {
        Self::new(cfg.move_action.clone(), cfg.cut.clone(), cfg.home.clone())
    }

    pub fn build_move(&self, stamp: &str) -> CommandSpec {
        build_recording("Move", &self.move_action, stamp)
    }

    pub fn build_cut(&self, stamp: &str) -> CommandSpec {
        build_recording("Cut", &self.cut, stamp)
    }

    pub fn build_home(&self) -> CommandSpec {
        CommandSpec::new("Home", self.home.command.clone(), self.home.timeout())
    }
}

fn build_recording(name: &str, action: &ActionConfig, stamp: &str) -> CommandSpec {
    let mut argv = action.command.clone();
    argv.push(format!(
        "{}{}_{}",
        action.run_id_arg, action.run_id_prefix, stamp
    ));
    CommandSpec::new(name, argv, action.timeout())
}
