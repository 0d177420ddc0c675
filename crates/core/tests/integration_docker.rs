//! Integration tests against a real Docker daemon.
//!
//! Skipped when `docker info` fails or the test image cannot be pulled.

mod common;

use common::is_docker_available;
use dockshell_core::config::SessionConfig;
use dockshell_core::runtime::{CliRuntime, ContainerRuntime};
use dockshell_core::{with_container, Container, ContainerState, Invocation};
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

const TEST_IMAGE: &str = "alpine:3.19";

fn docker_ready(test: &str) -> bool {
    if !is_docker_available() {
        eprintln!("Skipping {}: Docker not available", test);
        return false;
    }
    let pulled = Command::new("docker")
        .args(["pull", "--quiet", TEST_IMAGE])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if !pulled {
        eprintln!("Skipping {}: could not pull {}", test, TEST_IMAGE);
    }
    pulled
}

#[test]
#[serial]
fn test_docker_execute_and_teardown() {
    if !docker_ready("test_docker_execute_and_teardown") {
        return;
    }

    std::env::set_var("DOCKSHELL", "1");
    let mut container =
        Container::acquire(Box::new(CliRuntime::docker()), SessionConfig::for_image(TEST_IMAGE))
            .unwrap();
    std::env::remove_var("DOCKSHELL");
    let name = container.name().to_string();

    let output = container
        .call(&Invocation::new(["echo", "hello"]).capture_output())
        .unwrap();
    assert_eq!(output, "hello\n");

    let err = container.call(&Invocation::new(["false"])).unwrap_err();
    assert_eq!(err.exit_status(), Some(1));

    let output = container
        .call(
            &Invocation::new(["sh", "-c", "echo $DEST; pwd"])
                .env("DEST", "/tmp/out")
                .cwd("/tmp")
                .capture_output(),
        )
        .unwrap();
    assert_eq!(output, "/tmp/out\n/tmp\n");

    // identity variable is passed through from the host environment on create
    let output = container
        .call(&Invocation::new(["sh", "-c", "echo ${DOCKSHELL-unset}"]).capture_output())
        .unwrap();
    assert_eq!(output, "1\n");

    container.release().unwrap();
    assert_eq!(container.state(), ContainerState::TornDown);
    assert!(!CliRuntime::docker().container_exists(&name).unwrap());
}

#[test]
fn test_docker_copy_round_trip() {
    if !docker_ready("test_docker_copy_round_trip") {
        return;
    }

    let source = tempfile::tempdir().unwrap();
    fs::create_dir_all(source.path().join("pkg")).unwrap();
    fs::write(source.path().join("pkg/module.py"), "VALUE = 1\n").unwrap();
    fs::write(source.path().join("README"), "readme\n").unwrap();
    let back = tempfile::tempdir().unwrap();
    let out = back.path().join("out");

    with_container(
        Box::new(CliRuntime::docker()),
        SessionConfig::for_image(TEST_IMAGE),
        |container| {
            container.copy_into(source.path(), Path::new("/project"))?;
            let listing = container.call(
                &Invocation::new(["cat", "/project/pkg/module.py"]).capture_output(),
            )?;
            assert_eq!(listing, "VALUE = 1\n");

            container.copy_into(
                &source.path().join("README"),
                Path::new("/project/README.copy"),
            )?;
            container.copy_out(Path::new("/project"), &out)
        },
    )
    .unwrap();

    assert_eq!(fs::read_to_string(out.join("pkg/module.py")).unwrap(), "VALUE = 1\n");
    assert_eq!(fs::read_to_string(out.join("README.copy")).unwrap(), "readme\n");
}

#[test]
fn test_docker_host_root_is_mounted() {
    if !docker_ready("test_docker_host_root_is_mounted") {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("marker.txt"), "from host\n").unwrap();

    with_container(
        Box::new(CliRuntime::docker()),
        SessionConfig::for_image(TEST_IMAGE),
        |container| {
            let inside = container.host_path(&dir.path().join("marker.txt"));
            let output = container.call(
                &Invocation::new(["cat", inside.to_str().unwrap_or_default()]).capture_output(),
            )?;
            assert_eq!(output, "from host\n");
            Ok(())
        },
    )
    .unwrap();
}
