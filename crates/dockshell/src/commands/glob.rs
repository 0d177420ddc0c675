//! Glob command implementation

use anyhow::Result;
use dockshell_core::config::SessionConfig;
use dockshell_core::runtime::ContainerRuntime;
use dockshell_core::with_container;
use std::io::Write;
use tracing::instrument;

/// Execute the glob command, printing one match per line
#[instrument(skip(runtime, config))]
pub fn execute_glob(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    pattern: &str,
) -> Result<()> {
    let matches = with_container(runtime, config, |container| container.glob(pattern))?;

    let mut stdout = std::io::stdout().lock();
    for path in &matches {
        writeln!(stdout, "{}", path.display())?;
    }
    stdout.flush()?;
    Ok(())
}
