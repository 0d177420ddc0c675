//! Copy command implementations
//!
//! Containers do not outlive one invocation of the binary, so each copy runs
//! in the same session as the optional command it feeds or drains.

use anyhow::Result;
use dockshell_core::config::SessionConfig;
use dockshell_core::runtime::ContainerRuntime;
use dockshell_core::{with_container, Container, Invocation};
use std::path::Path;
use tracing::{info, instrument};

fn run_optional(container: &mut Container, args: &[String]) -> dockshell_core::errors::Result<()> {
    if args.is_empty() {
        return Ok(());
    }
    container.call(&Invocation::new(args.iter().cloned()))?;
    Ok(())
}

/// Copy `host_path` into the container, then run `args` if given
#[instrument(skip(runtime, config))]
pub fn execute_copy_in(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    host_path: &Path,
    container_path: &Path,
    args: Vec<String>,
) -> Result<()> {
    with_container(runtime, config, |container| {
        container.copy_into(host_path, container_path)?;
        info!(
            "Copied {} to {}",
            host_path.display(),
            container_path.display()
        );
        run_optional(container, &args)
    })?;
    Ok(())
}

/// Run `args` if given, then copy `container_path` out to `host_path`
#[instrument(skip(runtime, config))]
pub fn execute_copy_out(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    container_path: &Path,
    host_path: &Path,
    args: Vec<String>,
) -> Result<()> {
    with_container(runtime, config, |container| {
        run_optional(container, &args)?;
        container.copy_out(container_path, host_path)?;
        info!(
            "Copied {} to {}",
            container_path.display(),
            host_path.display()
        );
        Ok(())
    })?;
    Ok(())
}
