//! Error types and handling
//!
//! The error taxonomy is structured with specific error enums for each domain
//! (runtime setup, remote execution, file transfer, shell framing, configuration,
//! introspection) that are then wrapped in the main DockshellError enum for
//! unified error handling.

use thiserror::Error;

/// Container runtime errors (create/start/rm and friends)
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Runtime binary is not installed or not accessible
    #[error("Container runtime is not installed or not accessible")]
    NotInstalled,

    /// Runtime CLI command error
    #[error("Runtime CLI error: {0}")]
    CLIError(String),

    /// Container creation or start failed. Fatal for the session, never retried.
    #[error("Container setup failed during {stage}: {message}")]
    SetupFailed { stage: String, message: String },
}

/// A remote command finished with a non-zero exit status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command `{}` returned non-zero exit status {status}", .args.join(" "))]
pub struct ExecutionError {
    /// Exit status decoded from the footer
    pub status: u16,
    /// Argument vector as supplied by the caller
    pub args: Vec<String>,
    /// Captured output, present only when capture was requested
    pub output: Option<String>,
}

/// Archive streaming errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// One side of the archive pipe exited unsuccessfully or was killed
    #[error("Archive streaming {direction} failed: {status}")]
    ProcessFailed {
        direction: String,
        status: std::process::ExitStatus,
    },

    /// Archive could not be produced or unpacked
    #[error("Archive error while copying {path}")]
    Archive {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Transfer process could not be spawned or driven
    #[error("Transfer I/O error")]
    Io(#[from] std::io::Error),
}

/// Violations of the footer framing on the persistent shell
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The shell's output closed before the footer appeared
    #[error("Shell output ended before the end-of-command footer was seen")]
    MissingFooter,

    /// The status field in front of the delimiter is not four decimal digits
    #[error("Malformed exit status field in footer: {field:?}")]
    MalformedStatus { field: String },

    /// Exit status cannot be represented in the fixed-width field
    #[error("Exit status {status} does not fit the 4-digit footer field")]
    StatusOutOfRange { status: u32 },

    /// Shell is not attached (container not running)
    #[error("Shell is not running (container is {state})")]
    NotRunning { state: String },

    /// A previous call aborted mid-frame; the stream position is unknown
    #[error("Shell session is poisoned by an earlier interrupted command")]
    SessionPoisoned,

    /// The optional deadline elapsed before the footer arrived
    #[error("Deadline of {millis}ms exceeded while waiting for command output")]
    DeadlineExceeded { millis: u128 },

    /// Captured output is not UTF-8; the frame itself was read completely
    #[error("Output captured from a command with exit status {status} is not valid UTF-8")]
    InvalidOutput {
        status: u16,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Writing to or reading from the shell channels failed
    #[error("Shell channel I/O error")]
    Channel(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Errors decoding the result of a remote one-shot expression
#[derive(Error, Debug)]
pub enum IntrospectionError {
    /// Remote interpreter output was not the expected JSON document
    #[error("Failed to decode {what} from container output")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// Command line could not be split into words
    #[error("Failed to tokenize command line {command:?}: {message}")]
    Tokenize { command: String, message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum DockshellError {
    /// Container runtime errors
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Remote command failure
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// File transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Shell framing errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Introspection errors
    #[error("Introspection error: {0}")]
    Introspection(#[from] IntrospectionError),

    /// Host-side I/O not covered by a more specific variant (e.g. the output sink)
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl DockshellError {
    /// The remote exit status, if this error is a failed remote command
    pub fn exit_status(&self) -> Option<u16> {
        match self {
            Self::Execution(e) => Some(e.status),
            Self::Protocol(ProtocolError::InvalidOutput { status, .. }) if *status != 0 => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results with DockshellError
pub type Result<T> = std::result::Result<T, DockshellError>;
