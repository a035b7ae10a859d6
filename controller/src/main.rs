//! Cutting-task controller CLI.
//!
//! `controller run` drives the MOVE / HOME / CHECK_POSITION / CUT / CHECK_CUT
//! loop against the configured actuation and perception commands and exits
//! with a code describing how the run ended (see `exit_codes`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use controller::exit_codes;
use controller::io::config::{DEFAULT_CONFIG_PATH, ControllerConfig, load_config, write_config};
use controller::io::oracle::{CommandOracle, PerceptionOracle};
use controller::io::process::SystemProcessRunner;
use controller::io::shutdown::Shutdown;
use controller::logging::{self, LogFormat};
use controller::machine::{MachineSettings, StateMachine};

#[derive(Parser)]
#[command(
    name = "controller",
    version,
    about = "Closed-loop controller for the bimanual cutting task"
)]
struct Cli {
    /// Path to the TOML config (defaults apply when the file is missing).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until the cut is confirmed or the run aborts.
    Run {
        /// Override `max_iterations` from the config.
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Query the classifier once and print `yes` or `no`.
    Ask {
        #[arg(value_enum)]
        model: ModelArg,
    },
    /// Write the default config file if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config.
    CheckConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    Position,
    Cut,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(err = %format!("{err:#}"), "controller failed");
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { max_iterations } => cmd_run(&cli.config, max_iterations),
        Command::Ask { model } => cmd_ask(&cli.config, model),
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::CheckConfig => cmd_check_config(&cli.config),
    }
}

fn cmd_run(config_path: &Path, max_iterations: Option<u32>) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    if let Some(max_iterations) = max_iterations {
        cfg.max_iterations = max_iterations;
        cfg.validate().context("--max-iterations")?;
    }

    let shutdown = Shutdown::new();
    shutdown.install_ctrlc_handler()?;

    let runner = SystemProcessRunner::new(cfg.kill_grace(), shutdown.clone());
    let oracle = CommandOracle::new(runner.clone(), cfg.perception.clone());
    let report = StateMachine::new(runner, oracle, MachineSettings::from_config(&cfg))
        .with_shutdown(shutdown)
        .run();

    let code = exit_codes::for_termination(&report.termination);
    info!(termination = ?report.termination, exit_code = code, "run ended");
    Ok(code)
}

fn cmd_ask(config_path: &Path, model: ModelArg) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let shutdown = Shutdown::new();
    shutdown.install_ctrlc_handler()?;

    let runner = SystemProcessRunner::new(cfg.kill_grace(), shutdown);
    let model_id = match model {
        ModelArg::Position => cfg.perception.position_model.clone(),
        ModelArg::Cut => cfg.perception.cut_model.clone(),
    };
    let reading = CommandOracle::new(runner, cfg.perception).ask(&model_id);
    println!("{}", if reading.verdict() { "yes" } else { "no" });
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        info!(path = %config_path.display(), "config already exists");
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &ControllerConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    info!(path = %config_path.display(), "wrote default config");
    Ok(exit_codes::OK)
}

fn cmd_check_config(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    info!(
        path = %config_path.display(),
        max_iterations = cfg.max_iterations,
        "config is valid"
    );
    Ok(exit_codes::OK)
}
