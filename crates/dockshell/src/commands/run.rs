//! Run command implementation
//!
//! Implements `dockshell run`: acquire a container, execute one command in its
//! persistent shell, release it.

use super::env_map;
use anyhow::Result;
use dockshell_core::config::SessionConfig;
use dockshell_core::runtime::ContainerRuntime;
use dockshell_core::{with_container, Invocation};
use std::io::Write;
use tracing::{debug, instrument};

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Command and arguments
    pub args: Vec<String>,
    /// Variables exported before the command runs
    pub env: Vec<(String, String)>,
    /// Working directory inside the container
    pub cwd: Option<String>,
    /// Print the output once the command finishes instead of streaming it
    pub capture: bool,
}

impl RunArgs {
    fn invocation(&self) -> Invocation {
        let mut invocation = Invocation::new(self.args.iter().cloned())
            .envs(env_map(self.env.clone()));
        if let Some(cwd) = &self.cwd {
            invocation = invocation.cwd(cwd.clone());
        }
        if self.capture {
            invocation = invocation.capture_output();
        }
        invocation
    }
}

/// Execute the run command
#[instrument(skip(runtime, config))]
pub fn execute_run(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    args: RunArgs,
) -> Result<()> {
    let invocation = args.invocation();
    let output = with_container(runtime, config, |container| container.call(&invocation))?;

    if args.capture {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()?;
    }
    debug!("Run command completed");
    Ok(())
}
