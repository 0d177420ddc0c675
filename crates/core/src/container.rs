//! Container lifecycle management
//!
//! A [`Container`] is one ephemeral container plus the persistent shell
//! attached to it. It is created by [`Container::acquire`] and torn down by
//! [`Container::release`], which also runs from `Drop` so an early return or a
//! panic never leaks a running container. [`with_container`] wraps the pair in
//! a scope.

use crate::config::SessionConfig;
use crate::errors::{ConfigError, ProtocolError, Result};
use crate::protocol::random_token;
use crate::runtime::{ContainerRuntime, CreateSpec};
use crate::shell::{Invocation, ShellSession};
use std::fmt;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Uninitialized,
    Running,
    TornDown,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::TornDown => "torn down",
        })
    }
}

/// Generate a container name unique to this run
pub fn generate_container_name(prefix: &str) -> String {
    format!("{}-{}", prefix, random_token())
}

/// A running container with its persistent shell
pub struct Container {
    name: String,
    image: String,
    config: SessionConfig,
    pub(crate) runtime: Box<dyn ContainerRuntime>,
    shell: Option<ShellSession>,
    state: ContainerState,
    sink: Box<dyn Write + Send>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("image", &self.image)
            .field("runtime", &self.runtime.runtime_name())
            .field("state", &self.state)
            .field("shell", &self.shell)
            .finish()
    }
}

impl Container {
    /// Create and start a container, attaching its persistent shell
    ///
    /// Fails without retrying if create or start fails. A container that was
    /// created but could not be started is removed again before returning.
    #[instrument(skip(runtime, config), fields(image = ?config.image))]
    pub fn acquire(runtime: Box<dyn ContainerRuntime>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        runtime.check_installed()?;
        let image = config.image.clone().ok_or_else(|| ConfigError::Validation {
            message: "an image reference is required".to_string(),
        })?;

        let mut container = Self {
            name: generate_container_name(&config.name_prefix),
            image,
            config,
            runtime,
            shell: None,
            state: ContainerState::Uninitialized,
            sink: Box::new(io::stdout()),
        };

        let spec = CreateSpec {
            name: container.name.clone(),
            image: container.image.clone(),
            identity_env: container.config.identity_env.clone(),
            host_mount: container.config.host_mount.clone(),
            shell: container.config.shell.clone(),
        };
        container.runtime.create(&spec)?;
        debug!(name = %container.name, "Container created");

        let shell = container
            .runtime
            .start_attached(&container.name)
            .and_then(|child| ShellSession::attach(child, container.config.input_buffer_bytes));
        match shell {
            Ok(shell) => {
                container.shell =
                    Some(shell.escape_env_values(container.config.escape_env_values));
                container.state = ContainerState::Running;
            }
            Err(e) => {
                if let Err(remove_err) = container.runtime.remove(&container.name) {
                    warn!(
                        "Failed to remove container {} after start failure: {}",
                        container.name, remove_err
                    );
                }
                container.state = ContainerState::TornDown;
                return Err(e);
            }
        }

        info!(
            name = %container.name,
            runtime = container.runtime.runtime_name(),
            "Container running"
        );
        Ok(container)
    }

    /// Tear down the shell and force-remove the container
    ///
    /// Closes the shell's stdin, terminates and reaps it, then removes the
    /// container with its anonymous volumes. Calling it again is a no-op.
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn release(&mut self) -> Result<()> {
        if self.state != ContainerState::Running {
            return Ok(());
        }
        self.state = ContainerState::TornDown;

        let shell_result = match self.shell.take() {
            Some(mut shell) => shell.close(),
            None => Ok(()),
        };
        if let Err(e) = &shell_result {
            warn!("Failed to close persistent shell: {}", e);
        }

        // removal runs even when closing the shell failed
        self.runtime.remove(&self.name)?;
        debug!("Container removed");
        shell_result
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the sink that streamed output is written to (stdout by default)
    pub fn set_output_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sink = sink;
    }

    /// Location of a host path inside the container, through the host-root bind mount
    pub fn host_path(&self, host_path: &Path) -> PathBuf {
        map_host_path(&self.config.host_mount, host_path)
    }

    /// Run one command in the persistent shell
    ///
    /// Returns captured output when the invocation asks for it, otherwise an
    /// empty string after streaming to the output sink.
    pub fn call(&mut self, invocation: &Invocation) -> Result<String> {
        let (shell, sink) = self.session()?;
        shell.execute(invocation, sink)
    }

    /// Run one command, giving up after `deadline`
    ///
    /// On expiry the shell is left mid-command and every later call fails;
    /// release the container and acquire a new one.
    pub fn call_with_deadline(
        &mut self,
        invocation: &Invocation,
        deadline: Duration,
    ) -> Result<String> {
        let (shell, sink) = self.session()?;
        shell.execute_with_deadline(invocation, sink, deadline)
    }

    fn session(&mut self) -> Result<(&mut ShellSession, &mut dyn Write)> {
        match (self.state, self.shell.as_mut()) {
            (ContainerState::Running, Some(shell)) => Ok((shell, self.sink.as_mut())),
            (state, _) => Err(ProtocolError::NotRunning {
                state: state.to_string(),
            }
            .into()),
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.state == ContainerState::Running {
            if let Err(e) = self.release() {
                warn!("Failed to release container {}: {}", self.name, e);
            }
        }
    }
}

/// Run `f` against a freshly acquired container, releasing it on every path
///
/// An error from `f` wins over a release error; the release error is logged.
pub fn with_container<T, F>(
    runtime: Box<dyn ContainerRuntime>,
    config: SessionConfig,
    f: F,
) -> Result<T>
where
    F: FnOnce(&mut Container) -> Result<T>,
{
    let mut container = Container::acquire(runtime, config)?;
    let result = f(&mut container);
    let released = container.release();

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!(
                "Failed to release container {} after error: {}",
                container.name(),
                release_err
            );
            Err(e)
        }
    }
}

fn map_host_path(host_mount: &Path, host_path: &Path) -> PathBuf {
    let mut mapped = host_mount.to_path_buf();
    for component in host_path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            other => mapped.push(other.as_os_str()),
        }
    }
    mapped
}
