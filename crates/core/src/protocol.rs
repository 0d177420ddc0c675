//! Footer framing for the persistent shell
//!
//! The shell has no message boundaries, so every command is wrapped in a
//! subshell whose last action prints a footer line:
//!
//! ```text
//! <4-digit zero-padded exit status><delimiter>\n
//! ```
//!
//! The delimiter is a fresh random token per call. Any line whose trailing
//! bytes equal `<delimiter>\n` is taken as the footer, including a line where
//! the command's own unterminated output precedes the status field. Ordinary
//! output that happens to end with the same token would terminate the frame
//! early; the token is 122 random bits, and no stricter framing is attempted.

use crate::errors::{ProtocolError, Result};
use indexmap::IndexMap;
use std::fmt;

/// Width of the zero-padded exit status field
pub const STATUS_WIDTH: usize = 4;

/// Largest exit status the footer can carry
pub const MAX_STATUS: u32 = 9999;

/// Generate a random token shaped like a version 4 UUID
pub fn random_token() -> String {
    let hi = fastrand::u64(..);
    let lo = fastrand::u64(..);
    // version 4, RFC 4122 variant
    let hi = (hi & 0xffff_ffff_ffff_0fff) | 0x0000_0000_0000_4000;
    let lo = (lo & 0x3fff_ffff_ffff_ffff) | 0x8000_0000_0000_0000;
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        hi >> 32,
        (hi >> 16) & 0xffff,
        hi & 0xffff,
        lo >> 48,
        lo & 0xffff_ffff_ffff
    )
}

/// Per-invocation end-of-output marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter(String);

impl Delimiter {
    /// Fresh random delimiter
    pub fn generate() -> Self {
        Self(random_token())
    }

    /// Delimiter from a known token. Tokens must not contain shell
    /// metacharacters or newlines; they are written unquoted.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn terminator(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes.push(b'\n');
        bytes
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode the footer line the remote shell prints for `status`
pub fn encode_footer(status: u32, delimiter: &Delimiter) -> Result<String> {
    if status > MAX_STATUS {
        return Err(ProtocolError::StatusOutOfRange { status }.into());
    }
    Ok(format!("{:04}{}\n", status, delimiter))
}

/// Classification of one line read from the shell
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Ordinary command output, forwarded as-is
    Output,
    /// End of the command. `output` is whatever the command printed on the
    /// same line before the status field.
    Footer { output: &'a [u8], status: u16 },
}

/// Classify a line (including its trailing newline) against `delimiter`
pub fn scan_line<'a>(line: &'a [u8], delimiter: &Delimiter) -> Result<Frame<'a>> {
    let terminator = delimiter.terminator();
    if !line.ends_with(&terminator) {
        return Ok(Frame::Output);
    }

    let Some(footer_offset) = line.len().checked_sub(terminator.len() + STATUS_WIDTH) else {
        return Err(ProtocolError::MalformedStatus {
            field: String::from_utf8_lossy(&line[..line.len() - terminator.len()]).into_owned(),
        }
        .into());
    };

    let field = &line[footer_offset..footer_offset + STATUS_WIDTH];
    if !field.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::MalformedStatus {
            field: String::from_utf8_lossy(field).into_owned(),
        }
        .into());
    }

    let status = field
        .iter()
        .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));

    Ok(Frame::Footer {
        output: &line[..footer_offset],
        status,
    })
}

/// How argument words are quoted in the generated script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgQuoting {
    /// Single-quote every word; the command sees exactly the given strings
    #[default]
    Literal,
    /// Double-quote every word; `$NAME` and `${NAME}` expand inside the
    /// container, word splitting and globbing do not
    ExpandVariables,
}

/// Quote `word` inside double quotes, leaving parameter expansion active
pub fn quote_expanding(word: &str) -> String {
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for ch in word.chars() {
        if matches!(ch, '"' | '\\' | '`') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Everything the script needs besides the delimiter
#[derive(Debug, Clone, Copy)]
pub struct ScriptParts<'a> {
    pub args: &'a [String],
    pub env: &'a IndexMap<String, String>,
    pub cwd: Option<&'a str>,
    pub quoting: ArgQuoting,
    /// Shell-quote environment values instead of passing them verbatim
    pub escape_env_values: bool,
}

/// Build the subshell script written to the shell for one invocation
///
/// Environment keys are always interpolated literally. Values are verbatim
/// unless `escape_env_values` is set, so callers may rely on expansions such
/// as `PATH=/opt/bin:$PATH`.
pub fn build_script(parts: &ScriptParts<'_>, delimiter: &Delimiter) -> String {
    let mut script = String::from("(\n");

    for (key, value) in parts.env {
        if parts.escape_env_values {
            script.push_str(&format!("export {}={}\n", key, shell_words::quote(value)));
        } else {
            script.push_str(&format!("export {}={}\n", key, value));
        }
    }

    if let Some(cwd) = parts.cwd {
        script.push_str(&format!("cd {}\n", shell_words::quote(cwd)));
    }

    script.push_str(&command_line(parts.args, parts.quoting));
    script.push('\n');

    script.push_str(&format!("printf \"%04d%s\\n\" $? {}\n", delimiter));
    script.push_str(")\n");
    script
}

/// Render the argument vector as a shell command line
pub fn command_line(args: &[String], quoting: ArgQuoting) -> String {
    match quoting {
        ArgQuoting::Literal => shell_words::join(args),
        ArgQuoting::ExpandVariables => args
            .iter()
            .map(|arg| quote_expanding(arg))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
