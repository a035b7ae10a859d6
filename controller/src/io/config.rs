//! Controller configuration stored in `controller.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "controller.toml";

const LEROBOT_ENV: &[&str] = &["conda", "run", "-n", "lerobot010_v2", "python", "-m"];
const FOLLOWER_ARGS: &[&str] = &[
    "--robot.type=so101_follower",
    "--robot.port=/dev/ttyACM0",
    "--robot.id=my_awesome_follower_arm",
];
const CAMERAS_ARG: &str = "--robot.cameras={ left: {type: opencv, index_or_path: 0, width: 640, height: 480, fps: 10}, right: {type: opencv, index_or_path: 2, width: 640, height: 480, fps: 10} }";

/// Controller configuration (TOML).
///
/// Edited by operators. Any missing field or table falls back to the bench
/// deployment defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Safety bound on total loop cycles per run.
    pub max_iterations: u32,

    /// Milliseconds between SIGTERM and SIGKILL when a command is terminated.
    pub kill_grace_ms: u64,

    /// Abort after this many consecutive MOVE/CUT launch failures.
    /// Unset means launch failures are retried up to `max_iterations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_failure_limit: Option<u32>,

    #[serde(rename = "move", deserialize_with = "deserialize_move")]
    pub move_action: ActionConfig,

    #[serde(deserialize_with = "deserialize_cut")]
    pub cut: ActionConfig,

    pub home: HomeConfig,

    pub perception: PerceptionConfig,
}

/// A recording-policy action (MOVE, CUT) whose argv gets a fresh run identifier.
///
/// MOVE and CUT run different policies, so a partial `[move]` or `[cut]`
/// table is layered over that action's own defaults.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActionConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Flag prefix the run identifier is appended to.
    pub run_id_arg: String,
    /// Namespace prepended to the run identifier.
    pub run_id_prefix: String,
}

/// Fields present in a `[move]` / `[cut]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActionOverrides {
    command: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    run_id_arg: Option<String>,
    run_id_prefix: Option<String>,
}

impl ActionOverrides {
    fn apply(self, base: ActionConfig) -> ActionConfig {
        ActionConfig {
            command: self.command.unwrap_or(base.command),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
            run_id_arg: self.run_id_arg.unwrap_or(base.run_id_arg),
            run_id_prefix: self.run_id_prefix.unwrap_or(base.run_id_prefix),
        }
    }
}

fn deserialize_move<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ActionConfig, D::Error> {
    Ok(ActionOverrides::deserialize(deserializer)?.apply(ActionConfig::default_move()))
}

fn deserialize_cut<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ActionConfig, D::Error> {
    Ok(ActionOverrides::deserialize(deserializer)?.apply(ActionConfig::default_cut()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HomeConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Base argv of the single-shot classifier.
    pub command: Vec<String>,
    pub model_arg: String,
    pub source_arg: String,
    /// Camera / source selector passed with `source_arg`.
    pub source: String,
    pub position_model: String,
    pub cut_model: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

fn default_action_timeout_secs() -> u64 {
    30
}

fn default_home_timeout_secs() -> u64 {
    5
}

fn default_run_id_arg() -> String {
    "--dataset.repo_id=".to_string()
}

fn default_run_id_prefix() -> String {
    "JaredBailey/eval_lerobot-yellow-brick".to_string()
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

fn record_command(policy_path: &str) -> Vec<String> {
    let mut command = strings(LEROBOT_ENV);
    command.push("lerobot.record".to_string());
    command.extend(strings(FOLLOWER_ARGS));
    command.push(CAMERAS_ARG.to_string());
    command.push(format!("--policy.path={policy_path}"));
    command.extend(strings(&[
        "--dataset.single_task=YellowBrickPurpleRectangle",
        "--dataset.push_to_hub=false",
        "--display_data=true",
    ]));
    command
}

impl ActionConfig {
    pub fn default_move() -> Self {
        Self::recording("outputs/train/act_cc_v10_full_run/checkpoints/100000/pretrained_model")
    }

    pub fn default_cut() -> Self {
        Self::recording("outputs/train/act_cc_v11_full_run/checkpoints/100000/pretrained_model")
    }

    fn recording(policy_path: &str) -> Self {
        Self {
            command: record_command(policy_path),
            timeout_secs: default_action_timeout_secs(),
            run_id_arg: default_run_id_arg(),
            run_id_prefix: default_run_id_prefix(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl HomeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HomeConfig {
    fn default() -> Self {
        let mut command = strings(LEROBOT_ENV);
        command.push("lerobot.teleoperate".to_string());
        command.extend(strings(FOLLOWER_ARGS));
        command.extend(strings(&[
            "--teleop.type=so101_leader",
            "--teleop.port=/dev/ttyACM1",
            "--teleop.id=my_awesome_leader_arm",
        ]));
        Self {
            command,
            timeout_secs: default_home_timeout_secs(),
        }
    }
}

impl PerceptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            command: strings(&["conda", "run", "-n", "cv_models", "python", "yolo_classifier.py"]),
            model_arg: "--model-path".to_string(),
            source_arg: "--camera".to_string(),
            source: "2".to_string(),
            position_model: "yolov8_models/cheeto_position/best.pt".to_string(),
            cut_model: "yolov8_models/cheeto_cut/best.pt".to_string(),
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            kill_grace_ms: 2_000,
            launch_failure_limit: None,
            move_action: ActionConfig::default_move(),
            cut: ActionConfig::default_cut(),
            home: HomeConfig::default(),
            perception: PerceptionConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.launch_failure_limit == Some(0) {
            return Err(anyhow!("launch_failure_limit must be > 0 when set"));
        }
        validate_command("move.command", &self.move_action.command)?;
        validate_command("cut.command", &self.cut.command)?;
        validate_command("home.command", &self.home.command)?;
        validate_command("perception.command", &self.perception.command)?;
        for (key, secs) in [
            ("move.timeout_secs", self.move_action.timeout_secs),
            ("cut.timeout_secs", self.cut.timeout_secs),
            ("home.timeout_secs", self.home.timeout_secs),
            ("perception.timeout_secs", self.perception.timeout_secs),
        ] {
            if secs == 0 {
                return Err(anyhow!("{key} must be > 0"));
            }
        }
        if self.perception.position_model.trim().is_empty() {
            return Err(anyhow!("perception.position_model must be non-empty"));
        }
        if self.perception.cut_model.trim().is_empty() {
            return Err(anyhow!("perception.cut_model must be non-empty"));
        }
        if self.perception.output_limit_bytes == 0 {
            return Err(anyhow!("perception.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

fn validate_command(key: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{key} must be a non-empty array")),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ControllerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ControllerConfig> {
    if !path.exists() {
        let cfg = ControllerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ControllerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ControllerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
