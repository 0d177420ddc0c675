use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dockshell_core::config::SessionConfig;
use dockshell_core::logging::LogSettings;
use dockshell_core::runtime::{RuntimeFactory, RuntimeKind};
use std::path::PathBuf;

use crate::commands;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
    /// Run the shell directly on the host, without a container
    Local,
}

impl From<RuntimeOption> for RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => RuntimeKind::Docker,
            RuntimeOption::Podman => RuntimeKind::Podman,
            RuntimeOption::Local => RuntimeKind::Local,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Parse a `KEY=VALUE` pair
pub fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Run commands in an ephemeral container through a persistent shell",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via DOCKSHELL_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Container runtime to use (docker, podman or local, can be set via DOCKSHELL_RUNTIME env var)
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the runtime executable
    #[arg(long, global = true, value_name = "PATH")]
    pub runtime_path: Option<String>,

    /// Session configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Image to create the container from (can be set via DOCKSHELL_IMAGE env var)
    #[arg(long, global = true, value_name = "IMAGE")]
    pub image: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one command in a fresh container
    Run {
        /// Environment variable exported for the command (KEY=VALUE, can be repeated)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Working directory inside the container
        #[arg(long, value_name = "DIR")]
        cwd: Option<String>,
        /// Collect output and print it once the command finishes
        #[arg(long)]
        capture: bool,
        /// Command and arguments
        #[arg(last = true, required = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Expand a glob pattern inside the container
    Glob {
        /// Pattern, relative to the shell's working directory unless absolute
        pattern: String,
    },

    /// Print the environment seen by commands in the container
    Env {
        /// Print as a JSON object instead of KEY=VALUE lines
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a command line with extra environment variables
    Eval {
        /// Environment variable available to the command line (KEY=VALUE, can be repeated)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Command line; `$NAME` references expand inside the container
        command_line: String,
    },

    /// Copy a host path into the container, then optionally run a command
    CopyIn {
        /// Host file or directory
        host_path: PathBuf,
        /// Destination inside the container
        container_path: PathBuf,
        /// Command to run after the copy
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Optionally run a command, then copy a container directory to the host
    CopyOut {
        /// Directory inside the container
        container_path: PathBuf,
        /// Host destination directory
        host_path: PathBuf,
        /// Command to run before the copy
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },
}

impl Cli {
    /// Resolve the session configuration: file < environment < flags
    pub fn session_config(&self) -> Result<SessionConfig> {
        let config = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => SessionConfig::default(),
        };
        let mut config = config.with_env_overrides()?;

        if let Some(image) = &self.image {
            config.image = Some(image.clone());
        }
        if let Some(runtime) = self.runtime {
            config.runtime = runtime.into();
        }
        if let Some(path) = &self.runtime_path {
            config.runtime_path = Some(path.clone());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None, // Let logging module check environment variable
        };

        let level = self.log_level.as_str();
        let settings = LogSettings::from_env(
            log_format,
            &format!("dockshell={},dockshell_core={}", level, level),
        )?;
        dockshell_core::logging::init(&settings)?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        let config = self.session_config()?;
        let runtime = RuntimeFactory::create_runtime(config.runtime, config.runtime_path.as_deref());

        match self.command {
            Commands::Run {
                env,
                cwd,
                capture,
                args,
            } => commands::run::execute_run(
                runtime,
                config,
                commands::run::RunArgs {
                    args,
                    env,
                    cwd,
                    capture,
                },
            ),
            Commands::Glob { pattern } => commands::glob::execute_glob(runtime, config, &pattern),
            Commands::Env { json } => commands::env::execute_env(runtime, config, json),
            Commands::Eval { env, command_line } => {
                commands::eval::execute_eval(runtime, config, &command_line, env)
            }
            Commands::CopyIn {
                host_path,
                container_path,
                args,
            } => commands::copy::execute_copy_in(
                runtime,
                config,
                &host_path,
                &container_path,
                args,
            ),
            Commands::CopyOut {
                container_path,
                host_path,
                args,
            } => commands::copy::execute_copy_out(
                runtime,
                config,
                &container_path,
                &host_path,
                args,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("X=val").unwrap(),
            ("X".to_string(), "val".to_string())
        );
        assert_eq!(
            parse_env_pair("PATH=/a:/b=c").unwrap(),
            ("PATH".to_string(), "/a:/b=c".to_string())
        );
        assert_eq!(
            parse_env_pair("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=value").is_err());
    }

    #[test]
    fn test_run_parses_trailing_args() {
        let cli = Cli::try_parse_from([
            "dockshell",
            "--runtime",
            "local",
            "--image",
            "local",
            "run",
            "--env",
            "A=1",
            "--cwd",
            "/tmp",
            "--",
            "echo",
            "--not-a-flag",
        ])
        .unwrap();

        assert_eq!(cli.runtime, Some(RuntimeOption::Local));
        match cli.command {
            Commands::Run {
                env, cwd, args, ..
            } => {
                assert_eq!(env, vec![("A".to_string(), "1".to_string())]);
                assert_eq!(cwd.as_deref(), Some("/tmp"));
                assert_eq!(args, vec!["echo", "--not-a-flag"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_args() {
        assert!(Cli::try_parse_from(["dockshell", "run"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "dockshell",
            "--runtime",
            "podman",
            "--image",
            "alpine:3.19",
            "--runtime-path",
            "/usr/local/bin/podman",
            "glob",
            "*.whl",
        ])
        .unwrap();

        let config = cli.session_config().unwrap();
        assert_eq!(config.image.as_deref(), Some("alpine:3.19"));
        assert_eq!(config.runtime, RuntimeKind::Podman);
        assert_eq!(config.runtime_path.as_deref(), Some("/usr/local/bin/podman"));
    }

    #[test]
    fn test_runtime_flag_beats_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "image = \"alpine:3.19\"\nruntime = \"podman\"\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from(["dockshell", "--config", &path, "glob", "*"]).unwrap();
        let from_file = cli.session_config().unwrap();
        if std::env::var_os("DOCKSHELL_RUNTIME").is_none() {
            assert_eq!(from_file.runtime, RuntimeKind::Podman);
        }

        let cli = Cli::try_parse_from([
            "dockshell", "--config", &path, "--runtime", "local", "glob", "*",
        ])
        .unwrap();
        assert_eq!(cli.session_config().unwrap().runtime, RuntimeKind::Local);
    }
}
