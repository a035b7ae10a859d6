//! CLI tests: spawn the controller binary against throwaway configs and check
//! that exit codes distinguish how the run ended.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;

use controller::exit_codes;
use controller::io::config::{ControllerConfig, load_config};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Config where every actuation is `true` and the classifier prints the given answers.
fn write_bench_config(dir: &Path, position_answer: &str, cut_answer: &str, max_iterations: u32) {
    let mut cfg = ControllerConfig {
        max_iterations,
        ..ControllerConfig::default()
    };
    cfg.move_action.command = vec!["true".to_string()];
    cfg.cut.command = vec!["true".to_string()];
    cfg.home.command = vec!["true".to_string()];
    cfg.perception.position_model = "position".to_string();
    cfg.perception.cut_model = "cut".to_string();
    // `sh -c` binds `--model-path` to $0, so the model id is $1.
    cfg.perception.command = sh(&format!(
        "if [ \"$1\" = position ]; then echo {position_answer}; else echo {cut_answer}; fi"
    ));
    cfg.perception.timeout_secs = 5;
    let path = dir.join("controller.toml");
    fs::write(&path, toml::to_string(&cfg).expect("serialize")).expect("write config");
}

fn controller(dir: &Path, args: &[&str]) -> Option<i32> {
    Command::new(env!("CARGO_BIN_EXE_controller"))
        .current_dir(dir)
        .args(args)
        .env("RUST_LOG", "warn")
        .status()
        .expect("spawn controller")
        .code()
}

#[test]
fn run_exits_ok_when_cut_confirmed() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_bench_config(temp.path(), "yes", "yes", 50);
    assert_eq!(controller(temp.path(), &["run"]), Some(exit_codes::OK));
}

#[test]
fn run_exits_with_bound_code_when_position_never_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_bench_config(temp.path(), "no", "yes", 50);
    assert_eq!(
        controller(temp.path(), &["run", "--max-iterations", "6"]),
        Some(exit_codes::ITERATION_BOUND)
    );
}

#[test]
fn ask_prints_verdict() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_bench_config(temp.path(), "no", "YES", 50);
    let output = Command::new(env!("CARGO_BIN_EXE_controller"))
        .current_dir(temp.path())
        .args(["ask", "cut"])
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn controller");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "yes\n");
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("controller.toml"), "max_iterations = 0\n").expect("write");
    assert_eq!(
        controller(temp.path(), &["check-config"]),
        Some(exit_codes::INVALID)
    );
    assert_eq!(controller(temp.path(), &["run"]), Some(exit_codes::INVALID));
}

#[test]
fn init_writes_loadable_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(controller(temp.path(), &["init"]), Some(exit_codes::OK));

    let loaded = load_config(&temp.path().join("controller.toml")).expect("load");
    assert_eq!(loaded, ControllerConfig::default());
    assert_eq!(
        controller(temp.path(), &["check-config"]),
        Some(exit_codes::OK)
    );
}
