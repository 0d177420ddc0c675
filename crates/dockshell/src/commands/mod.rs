//! Command implementations
//!
//! Every subcommand acquires one container, does its work inside
//! [`dockshell_core::with_container`], and releases the container before
//! returning.

pub mod copy;
pub mod env;
pub mod eval;
pub mod glob;
pub mod run;

use dockshell_core::IndexMap;

/// Collect `KEY=VALUE` flag pairs, later duplicates winning
pub(crate) fn env_map(pairs: Vec<(String, String)>) -> IndexMap<String, String> {
    pairs.into_iter().collect()
}
