//! Eval command implementation
//!
//! Runs an externally supplied command line through the environment executor
//! and prints what it wrote.

use super::env_map;
use anyhow::Result;
use dockshell_core::config::SessionConfig;
use dockshell_core::runtime::ContainerRuntime;
use dockshell_core::with_container;
use std::io::Write;
use tracing::instrument;

/// Execute the eval command
#[instrument(skip(runtime, config, env))]
pub fn execute_eval(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    command_line: &str,
    env: Vec<(String, String)>,
) -> Result<()> {
    let environment = env_map(env);
    let output = with_container(runtime, config, |container| {
        container.environment_executor(command_line, &environment)
    })?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
