//! Shared test helpers for core integration tests.
#![allow(dead_code)]

use dockshell_core::config::SessionConfig;
use dockshell_core::errors::Result;
use dockshell_core::runtime::local::LocalRuntime;
use dockshell_core::runtime::{ContainerRuntime, CreateSpec};
use std::io::{self, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

/// Output sink whose bytes stay readable after the container takes ownership
#[derive(Debug, Clone, Default)]
pub struct SharedSink(pub Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Local runtime handle that can be inspected after a container consumed it
#[derive(Debug, Clone, Default)]
pub struct SharedLocalRuntime(pub Arc<LocalRuntime>);

impl ContainerRuntime for SharedLocalRuntime {
    fn runtime_name(&self) -> &'static str {
        self.0.runtime_name()
    }

    fn create(&self, spec: &CreateSpec) -> Result<()> {
        self.0.create(spec)
    }

    fn start_attached(&self, name: &str) -> Result<Child> {
        self.0.start_attached(name)
    }

    fn exec_command(&self, name: &str, args: &[String]) -> Command {
        self.0.exec_command(name, args)
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.0.remove(name)
    }

    fn container_exists(&self, name: &str) -> Result<bool> {
        self.0.container_exists(name)
    }
}

pub fn local_config() -> SessionConfig {
    SessionConfig::for_image("local")
}

fn tool_available(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn is_python_available() -> bool {
    tool_available("python3", "--version")
}

pub fn is_tar_available() -> bool {
    tool_available("tar", "--version")
}

pub fn is_docker_available() -> bool {
    tool_available("docker", "info")
}
