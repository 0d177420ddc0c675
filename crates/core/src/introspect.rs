//! Introspection helpers
//!
//! Small queries answered by one-shot interpreter expressions run through the
//! persistent shell with output capture: glob expansion, a dump of the
//! container environment, and a generic "run this command line with this
//! environment" adapter for callers that evaluate externally supplied commands.

use crate::container::Container;
use crate::errors::{IntrospectionError, Result};
use crate::protocol::ArgQuoting;
use crate::shell::Invocation;
use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::debug;

/// Python string literal for `text`
///
/// JSON string syntax is a subset of Python's, so a serialized JSON string is
/// a valid literal for any pattern without lone surrogates.
fn python_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn glob_expression(pattern: &str) -> String {
    format!(
        "import sys, json, glob; json.dump(glob.glob({}), sys.stdout)",
        python_literal(pattern)
    )
}

const ENVIRONMENT_EXPRESSION: &str =
    "import sys, json, os; json.dump(dict(os.environ), sys.stdout)";

fn decode<T: serde::de::DeserializeOwned>(what: &str, output: &str) -> Result<T> {
    serde_json::from_str(output).map_err(|source| {
        IntrospectionError::Decode {
            what: what.to_string(),
            source,
        }
        .into()
    })
}

impl Container {
    fn utility_invocation(&self, expression: String) -> Invocation {
        Invocation::new([
            self.config().utility_python.clone(),
            "-c".to_string(),
            expression,
        ])
        .capture_output()
    }

    /// Expand a glob pattern inside the container
    ///
    /// Paths come back in the interpreter's enumeration order, unsorted.
    /// Relative patterns resolve against the shell's working directory.
    pub fn glob(&mut self, pattern: &str) -> Result<Vec<PathBuf>> {
        let invocation = self.utility_invocation(glob_expression(pattern));
        let output = self.call(&invocation)?;
        let paths: Vec<String> = decode("glob result", &output)?;
        debug!(pattern, matches = paths.len(), "Glob expanded");
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    /// Capture the environment of a process started by the container's shell
    pub fn get_environment(&mut self) -> Result<IndexMap<String, String>> {
        let invocation = self.utility_invocation(ENVIRONMENT_EXPRESSION.to_string());
        let output = self.call(&invocation)?;
        decode("environment", &output)
    }

    /// Split `command` into words and run it with `environment` exported
    ///
    /// Words are split with POSIX shell rules on the host. Inside the
    /// container each word is double-quoted, so `$NAME` references expand
    /// against the exported environment while the word boundaries stay as
    /// split. Returns the captured output.
    pub fn environment_executor(
        &mut self,
        command: &str,
        environment: &IndexMap<String, String>,
    ) -> Result<String> {
        let words = shell_words::split(command).map_err(|e| IntrospectionError::Tokenize {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let invocation = Invocation::new(words)
            .envs(environment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .quoting(ArgQuoting::ExpandVariables)
            .capture_output();
        self.call(&invocation)
    }
}
