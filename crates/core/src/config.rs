//! Session configuration
//!
//! Settings for one container session: which image and runtime to use, how the
//! container is created, and which interpreter the introspection helpers call.
//! Loaded from a TOML file, then overridden by `DOCKSHELL_*` environment
//! variables, then by CLI flags.

use crate::errors::{ConfigError, Result};
use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable passed through into every container by default
pub const DEFAULT_IDENTITY_ENV: &str = "DOCKSHELL";

/// Container path where the host root is bind-mounted
pub const DEFAULT_HOST_MOUNT: &str = "/host";

/// Capacity of the shell's write buffer. Large enough for a few hundred
/// kilobytes of exported environment in one script.
pub const DEFAULT_INPUT_BUFFER_BYTES: usize = 256 * 1024;

/// Configuration for one container session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Image reference the container is created from
    pub image: Option<String>,
    /// Container runtime to drive
    pub runtime: RuntimeKind,
    /// Explicit path to the runtime binary
    pub runtime_path: Option<String>,
    /// Prefix of generated container names
    pub name_prefix: String,
    /// Host environment variable passed through on create
    pub identity_env: String,
    /// Container path where the host root is bind-mounted
    pub host_mount: PathBuf,
    /// Command for the persistent shell; the image default when unset
    pub shell: Option<Vec<String>>,
    /// Interpreter used by glob and environment capture
    pub utility_python: String,
    /// Write buffer capacity for the shell's stdin
    pub input_buffer_bytes: usize,
    /// Shell-quote environment values instead of passing them verbatim
    pub escape_env_values: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            image: None,
            runtime: RuntimeKind::Docker,
            runtime_path: None,
            name_prefix: "dockshell".to_string(),
            identity_env: DEFAULT_IDENTITY_ENV.to_string(),
            host_mount: PathBuf::from(DEFAULT_HOST_MOUNT),
            shell: None,
            utility_python: "python3".to_string(),
            input_buffer_bytes: DEFAULT_INPUT_BUFFER_BYTES,
            escape_env_values: false,
        }
    }
}

impl SessionConfig {
    /// Default configuration for `image`
    pub fn for_image(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            ConfigError::Parsing {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        debug!("Loading session configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from `DOCKSHELL_IMAGE`, `DOCKSHELL_RUNTIME` and
    /// `DOCKSHELL_UTILITY_PYTHON`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(image) = lookup("DOCKSHELL_IMAGE").filter(|v| !v.is_empty()) {
            self.image = Some(image);
        }
        if let Some(runtime) = lookup("DOCKSHELL_RUNTIME").filter(|v| !v.is_empty()) {
            self.runtime = runtime.parse()?;
        }
        if let Some(python) = lookup("DOCKSHELL_UTILITY_PYTHON").filter(|v| !v.is_empty()) {
            self.utility_python = python;
        }
        Ok(self)
    }

    /// Reject configurations a session cannot be created from
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(ConfigError::Validation {
                message: message.to_string(),
            }
            .into())
        };

        match self.image.as_deref() {
            None | Some("") => return invalid("an image reference is required"),
            _ => {}
        }
        if self.name_prefix.is_empty() {
            return invalid("name_prefix must not be empty");
        }
        if self.identity_env.is_empty() || self.identity_env.contains('=') {
            return invalid("identity_env must be a bare variable name");
        }
        if !self.host_mount.is_absolute() {
            return invalid("host_mount must be an absolute container path");
        }
        if self.input_buffer_bytes == 0 {
            return invalid("input_buffer_bytes must be greater than zero");
        }
        if matches!(&self.shell, Some(argv) if argv.is_empty()) {
            return invalid("shell must name a command when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DockshellError;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.runtime, RuntimeKind::Docker);
        assert_eq!(config.identity_env, "DOCKSHELL");
        assert_eq!(config.host_mount, PathBuf::from("/host"));
        assert_eq!(config.input_buffer_bytes, 262144);
        assert!(!config.escape_env_values);
    }

    #[test]
    fn test_parse_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
image = "quay.io/pypa/manylinux2014_x86_64"
runtime = "podman"
identity_env = "CI_BUILD"
utility_python = "/opt/python/cp38-cp38/bin/python"
shell = ["/bin/bash"]
"#,
        )
        .unwrap();

        assert_eq!(
            config.image.as_deref(),
            Some("quay.io/pypa/manylinux2014_x86_64")
        );
        assert_eq!(config.runtime, RuntimeKind::Podman);
        assert_eq!(config.identity_env, "CI_BUILD");
        assert_eq!(config.shell, Some(vec!["/bin/bash".to_string()]));
        // untouched fields keep defaults
        assert_eq!(config.name_prefix, "dockshell");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = SessionConfig::from_toml_str("imag = \"typo\"").unwrap_err();
        assert!(matches!(
            err,
            DockshellError::Config(ConfigError::Parsing { .. })
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let err = SessionConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(
            err,
            DockshellError::Config(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockshell.toml");
        std::fs::write(&path, "image = \"alpine:3.19\"\nname_prefix = \"ci\"\n").unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.image.as_deref(), Some("alpine:3.19"));
        assert_eq!(config.name_prefix, "ci");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCKSHELL_IMAGE", "debian:bookworm"),
            ("DOCKSHELL_RUNTIME", "local"),
            ("DOCKSHELL_UTILITY_PYTHON", ""),
        ]
        .into_iter()
        .collect();

        let config = SessionConfig::for_image("alpine:3.19")
            .with_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.image.as_deref(), Some("debian:bookworm"));
        assert_eq!(config.runtime, RuntimeKind::Local);
        // empty values are ignored
        assert_eq!(config.utility_python, "python3");
    }

    #[test]
    fn test_override_rejects_unknown_runtime() {
        let result = SessionConfig::default().with_overrides_from(|key| {
            (key == "DOCKSHELL_RUNTIME").then(|| "containerd".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::default().validate().is_err());
        assert!(SessionConfig::for_image("").validate().is_err());
        assert!(SessionConfig::for_image("alpine").validate().is_ok());

        let mut config = SessionConfig::for_image("alpine");
        config.host_mount = PathBuf::from("host");
        assert!(config.validate().is_err());

        let mut config = SessionConfig::for_image("alpine");
        config.input_buffer_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::for_image("alpine");
        config.identity_env = "A=B".to_string();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::for_image("alpine");
        config.shell = Some(Vec::new());
        assert!(config.validate().is_err());
    }
}
