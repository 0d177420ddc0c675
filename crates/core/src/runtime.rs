//! Container runtime abstraction for Docker/Podman/local execution
//!
//! The runtime is an opaque CLI: create, start attached, exec, rm. Commands
//! logic only talks to the [`ContainerRuntime`] trait, so the same session code
//! drives Docker, Podman, or the [`local`] runtime that runs everything on the
//! host for tests and dry runs.

use crate::errors::{ConfigError, DockshellError, Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, instrument};

/// Parameters of `create`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    /// Unique container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Host environment variable passed through unchanged
    pub identity_env: String,
    /// Container path the host root is bind-mounted at
    pub host_mount: PathBuf,
    /// Explicit shell command; the image default when `None`
    pub shell: Option<Vec<String>>,
}

/// Operations the session needs from a container runtime
pub trait ContainerRuntime: fmt::Debug + Send {
    /// Short runtime name for logs ("docker", "podman", "local")
    fn runtime_name(&self) -> &'static str;

    /// Fail early when the runtime cannot be used at all
    fn check_installed(&self) -> Result<()> {
        Ok(())
    }

    /// Create a stopped container
    fn create(&self, spec: &CreateSpec) -> Result<()>;

    /// Start the container attached and interactive. The returned child has
    /// piped stdin and stdout connected to the container's main process.
    fn start_attached(&self, name: &str) -> Result<Child>;

    /// Command that runs `args` inside the container with stdin attached.
    /// Stdio is left for the caller to configure.
    fn exec_command(&self, name: &str, args: &[String]) -> Command;

    /// Force-remove the container and its anonymous volumes
    fn remove(&self, name: &str) -> Result<()>;

    /// Whether the runtime still lists a container with this exact name
    fn container_exists(&self, name: &str) -> Result<bool>;
}

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker CLI
    Docker,
    /// Podman CLI
    Podman,
    /// No container: shell and exec run directly on the host
    Local,
}

impl RuntimeKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
            Self::Local => "local",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = DockshellError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::Validation {
                message: format!(
                    "Unknown runtime: {}. Supported runtimes: docker, podman, local",
                    s
                ),
            }
            .into()),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime factory for creating container runtime instances
pub struct RuntimeFactory;

impl RuntimeFactory {
    /// Create a runtime instance, honouring an explicit binary path for CLI runtimes
    pub fn create_runtime(
        kind: RuntimeKind,
        runtime_path: Option<&str>,
    ) -> Box<dyn ContainerRuntime> {
        match (kind, runtime_path) {
            (RuntimeKind::Local, _) => Box::new(local::LocalRuntime::new()),
            (RuntimeKind::Docker, None) => Box::new(CliRuntime::docker()),
            (RuntimeKind::Podman, None) => Box::new(CliRuntime::podman()),
            (_, Some(path)) => Box::new(CliRuntime::with_runtime_path(path.to_string())),
        }
    }
}

/// Generic CLI-based container runtime implementation
///
/// Used for both Docker and Podman since they share a compatible CLI.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    /// Container runtime CLI binary path (e.g., "docker" or "podman")
    runtime_path: String,
}

impl CliRuntime {
    pub fn docker() -> Self {
        Self {
            runtime_path: "docker".to_string(),
        }
    }

    pub fn podman() -> Self {
        Self {
            runtime_path: "podman".to_string(),
        }
    }

    pub fn with_runtime_path(runtime_path: String) -> Self {
        Self { runtime_path }
    }

    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }

    /// Check if container runtime binary is available
    #[instrument(skip(self))]
    pub fn check_runtime_installed(&self) -> Result<()> {
        debug!(
            "Checking if container runtime binary is installed at: {}",
            self.runtime_path
        );

        match Command::new(&self.runtime_path).arg("--version").output() {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(
                    RuntimeError::CLIError(format!("Runtime version check failed: {}", stderr))
                        .into(),
                )
            }
            Err(e) => {
                debug!("Container runtime binary not found: {}", e);
                Err(RuntimeError::NotInstalled.into())
            }
        }
    }

    /// Arguments for `create`
    pub fn create_args(spec: &CreateSpec) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--env".to_string(),
            spec.identity_env.clone(),
            "--name".to_string(),
            spec.name.clone(),
            "--interactive".to_string(),
            "--volume".to_string(),
            format!("/:{}", spec.host_mount.display()),
            spec.image.clone(),
        ];
        if let Some(shell) = &spec.shell {
            args.extend(shell.iter().cloned());
        }
        args
    }

    /// Arguments for attaching to the container's main process
    pub fn start_args(name: &str) -> Vec<String> {
        vec![
            "start".to_string(),
            "--attach".to_string(),
            "--interactive".to_string(),
            name.to_string(),
        ]
    }

    /// Arguments for a one-shot exec with stdin attached
    pub fn exec_args(name: &str, args: &[String]) -> Vec<String> {
        let mut full = vec!["exec".to_string(), "-i".to_string(), name.to_string()];
        full.extend(args.iter().cloned());
        full
    }

    /// Arguments for forced removal including anonymous volumes
    pub fn remove_args(name: &str) -> Vec<String> {
        vec![
            "rm".to_string(),
            "--force".to_string(),
            "-v".to_string(),
            name.to_string(),
        ]
    }

    fn run(&self, args: &[String]) -> std::result::Result<String, String> {
        debug!(
            "Executing runtime command: {} {}",
            self.runtime_path,
            args.join(" ")
        );

        let output = Command::new(&self.runtime_path)
            .args(args)
            .output()
            .map_err(|e| format!("Failed to execute runtime command: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(stderr.trim().to_string());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::docker()
    }
}

impl ContainerRuntime for CliRuntime {
    fn runtime_name(&self) -> &'static str {
        if self.runtime_path.ends_with("podman") {
            "podman"
        } else {
            "docker"
        }
    }

    fn check_installed(&self) -> Result<()> {
        self.check_runtime_installed()
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    fn create(&self, spec: &CreateSpec) -> Result<()> {
        self.run(&Self::create_args(spec))
            .map(|_| ())
            .map_err(|message| {
                RuntimeError::SetupFailed {
                    stage: "create".to_string(),
                    message,
                }
                .into()
            })
    }

    #[instrument(skip(self))]
    fn start_attached(&self, name: &str) -> Result<Child> {
        Command::new(&self.runtime_path)
            .args(Self::start_args(name))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RuntimeError::SetupFailed {
                    stage: "start".to_string(),
                    message: e.to_string(),
                }
                .into()
            })
    }

    fn exec_command(&self, name: &str, args: &[String]) -> Command {
        let mut command = Command::new(&self.runtime_path);
        command.args(Self::exec_args(name, args));
        command
    }

    #[instrument(skip(self))]
    fn remove(&self, name: &str) -> Result<()> {
        self.run(&Self::remove_args(name))
            .map(|_| ())
            .map_err(|message| {
                RuntimeError::CLIError(format!("Remove command failed: {}", message)).into()
            })
    }

    #[instrument(skip(self))]
    fn container_exists(&self, name: &str) -> Result<bool> {
        let args = [
            "ps".to_string(),
            "--all".to_string(),
            "--filter".to_string(),
            format!("name=^{}$", name),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];
        let stdout = self.run(&args).map_err(|message| {
            RuntimeError::CLIError(format!("Container list failed: {}", message))
        })?;
        Ok(stdout.lines().any(|line| line.trim() == name))
    }
}

pub mod local {
    //! Host-local runtime
    //!
    //! Stands in for a container runtime without a daemon: the persistent
    //! shell is a host process and exec runs the command directly. Create and
    //! remove only track names, so teardown can still be observed. There is no
    //! isolation and no bind mount; paths are host paths.

    use super::{ContainerRuntime, CreateSpec};
    use crate::errors::{Result, RuntimeError};
    use std::collections::HashMap;
    use std::process::{Child, Command, Stdio};
    use std::sync::Mutex;
    use tracing::debug;

    /// Shell used when the create spec names none
    pub const DEFAULT_SHELL: &str = "sh";

    #[derive(Debug, Default)]
    pub struct LocalRuntime {
        /// Container name -> shell argv
        containers: Mutex<HashMap<String, Vec<String>>>,
    }

    impl LocalRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        fn shell_for(&self, name: &str) -> Option<Vec<String>> {
            self.containers
                .lock()
                .ok()
                .and_then(|containers| containers.get(name).cloned())
        }
    }

    impl ContainerRuntime for LocalRuntime {
        fn runtime_name(&self) -> &'static str {
            "local"
        }

        fn create(&self, spec: &CreateSpec) -> Result<()> {
            let mut containers = self.containers.lock().map_err(|_| {
                RuntimeError::SetupFailed {
                    stage: "create".to_string(),
                    message: "local runtime state poisoned".to_string(),
                }
            })?;
            if containers.contains_key(&spec.name) {
                return Err(RuntimeError::SetupFailed {
                    stage: "create".to_string(),
                    message: format!("container name {} already in use", spec.name),
                }
                .into());
            }
            let shell = spec
                .shell
                .clone()
                .unwrap_or_else(|| vec![DEFAULT_SHELL.to_string()]);
            debug!(name = %spec.name, ?shell, "local create");
            containers.insert(spec.name.clone(), shell);
            Ok(())
        }

        fn start_attached(&self, name: &str) -> Result<Child> {
            let shell = self.shell_for(name).ok_or_else(|| RuntimeError::SetupFailed {
                stage: "start".to_string(),
                message: format!("no such container: {}", name),
            })?;
            let (program, args) = shell.split_first().ok_or_else(|| RuntimeError::SetupFailed {
                stage: "start".to_string(),
                message: "empty shell command".to_string(),
            })?;
            Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| {
                    RuntimeError::SetupFailed {
                        stage: "start".to_string(),
                        message: e.to_string(),
                    }
                    .into()
                })
        }

        fn exec_command(&self, _name: &str, args: &[String]) -> Command {
            match args.split_first() {
                Some((program, rest)) => {
                    let mut command = Command::new(program);
                    command.args(rest);
                    command
                }
                None => Command::new(DEFAULT_SHELL),
            }
        }

        fn remove(&self, name: &str) -> Result<()> {
            if let Ok(mut containers) = self.containers.lock() {
                containers.remove(name);
            }
            Ok(())
        }

        fn container_exists(&self, name: &str) -> Result<bool> {
            Ok(self.shell_for(name).is_some())
        }
    }
}
