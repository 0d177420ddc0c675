//! Core library for dockshell
//!
//! Drives a persistent shell inside an ephemeral container: lifecycle
//! management, the footer-framed execution protocol, archive-piped file
//! transfer, and small introspection helpers built on top of them.

pub mod config;
pub mod container;
pub mod errors;
pub mod introspect;
pub mod logging;
pub mod protocol;
pub mod runtime;
pub mod shell;
pub mod transfer;

pub use container::{with_container, Container, ContainerState};
pub use shell::Invocation;

// Re-export IndexMap for use by dependent crates (environment maps keep insertion order)
pub use indexmap::IndexMap;
