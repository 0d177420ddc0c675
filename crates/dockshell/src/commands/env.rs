//! Env command implementation

use anyhow::Result;
use dockshell_core::config::SessionConfig;
use dockshell_core::runtime::ContainerRuntime;
use dockshell_core::{with_container, IndexMap};
use std::io::Write;
use tracing::instrument;

fn render_lines(environment: &IndexMap<String, String>) -> String {
    environment
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

/// Execute the env command
#[instrument(skip(runtime, config))]
pub fn execute_env(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    json: bool,
) -> Result<()> {
    let environment = with_container(runtime, config, |container| container.get_environment())?;

    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &environment)?;
        writeln!(stdout)?;
    } else {
        stdout.write_all(render_lines(&environment).as_bytes())?;
    }
    stdout.flush()?;
    Ok(())
}
