use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("dockshell").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("persistent shell"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("glob"))
        .stdout(predicate::str::contains("env"))
        .stdout(predicate::str::contains("eval"))
        .stdout(predicate::str::contains("copy-in"))
        .stdout(predicate::str::contains("copy-out"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("dockshell").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "dockshell {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_invalid_env_pair_rejected() {
    let mut cmd = Command::cargo_bin("dockshell").unwrap();
    cmd.args(["run", "--env", "novalue", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn test_missing_image_is_reported() {
    let mut cmd = Command::cargo_bin("dockshell").unwrap();
    cmd.env_remove("DOCKSHELL_IMAGE")
        .args(["--runtime", "local", "run", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("image"));
}

#[test]
fn test_missing_config_file_is_reported() {
    let mut cmd = Command::cargo_bin("dockshell").unwrap();
    cmd.args([
        "--runtime",
        "local",
        "--image",
        "local",
        "--config",
        "/nonexistent/dockshell.toml",
        "run",
        "--",
        "true",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("/nonexistent/dockshell.toml"));
}

#[test]
fn test_invalid_runtime_env_var_is_reported() {
    let mut cmd = Command::cargo_bin("dockshell").unwrap();
    cmd.env("DOCKSHELL_RUNTIME", "lxc")
        .args(["--image", "local", "run", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lxc"));
}
