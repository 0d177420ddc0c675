//! Persistent shell session
//!
//! Owns the write and read channels of the one long-lived shell attached to a
//! container and runs invocations over them, one at a time. Lines from the
//! shell's stdout are pumped by a reader thread into a channel so the optional
//! deadline can be enforced with `recv_timeout`; the base call blocks until the
//! footer appears, however long that takes.

use crate::errors::{ExecutionError, ProtocolError, Result};
use crate::protocol::{self, ArgQuoting, Delimiter, Frame, ScriptParts};
use indexmap::IndexMap;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::process::{Child, ChildStdin};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One command to run in the persistent shell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Argument vector; the first word is the program
    pub args: Vec<String>,
    /// Variables exported in the subshell before the command runs
    pub env: IndexMap<String, String>,
    /// Directory to change into first
    pub cwd: Option<String>,
    /// Accumulate output and return it instead of streaming to the sink
    pub capture_output: bool,
    /// How argument words are quoted
    pub quoting: ArgQuoting,
}

impl Invocation {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn capture_output(mut self) -> Self {
        self.capture_output = true;
        self
    }

    pub fn quoting(mut self, quoting: ArgQuoting) -> Self {
        self.quoting = quoting;
        self
    }

    /// The command as it is written to the shell
    pub fn command_line(&self) -> String {
        protocol::command_line(&self.args, self.quoting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Ready,
    /// A call failed between writing its script and reading its footer
    Poisoned,
    Closed,
}

type LineResult = io::Result<Vec<u8>>;

/// The attached shell process and its channels
pub struct ShellSession {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    lines: Receiver<LineResult>,
    reader: Option<JoinHandle<()>>,
    state: SessionState,
    escape_env_values: bool,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("pid", &self.child.id())
            .field("state", &self.state)
            .finish()
    }
}

impl ShellSession {
    /// Take over a spawned shell with piped stdin and stdout
    pub fn attach(mut child: Child, input_buffer_bytes: usize) -> Result<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            ProtocolError::Channel(io::Error::new(
                io::ErrorKind::NotConnected,
                "shell stdin is not piped",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ProtocolError::Channel(io::Error::new(
                io::ErrorKind::NotConnected,
                "shell stdout is not piped",
            ))
        })?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("dockshell-shell-reader".to_string())
            .spawn(move || pump_lines(stdout, tx))
            .map_err(ProtocolError::Channel)?;

        debug!(pid = child.id(), "Attached persistent shell");

        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(input_buffer_bytes, stdin)),
            lines: rx,
            reader: Some(reader),
            state: SessionState::Ready,
            escape_env_values: false,
        })
    }

    /// Shell-quote environment values in generated scripts
    pub fn escape_env_values(mut self, escape: bool) -> Self {
        self.escape_env_values = escape;
        self
    }

    pub fn is_poisoned(&self) -> bool {
        self.state == SessionState::Poisoned
    }

    /// Run one invocation, blocking until its footer arrives
    ///
    /// Streams output to `sink` line by line unless capture is requested.
    /// Returns the captured text (empty when streaming). A non-zero exit status
    /// is an [`ExecutionError`] carrying the status, arguments and any output.
    pub fn execute(&mut self, invocation: &Invocation, sink: &mut dyn Write) -> Result<String> {
        self.execute_inner(invocation, sink, None)
    }

    /// Like [`execute`](Self::execute), but gives up after `deadline`
    ///
    /// The remote command keeps running after the deadline passes and its
    /// footer is never consumed, so the session is poisoned and refuses
    /// further calls.
    pub fn execute_with_deadline(
        &mut self,
        invocation: &Invocation,
        sink: &mut dyn Write,
        deadline: Duration,
    ) -> Result<String> {
        self.execute_inner(invocation, sink, Some(deadline))
    }

    fn execute_inner(
        &mut self,
        invocation: &Invocation,
        sink: &mut dyn Write,
        deadline: Option<Duration>,
    ) -> Result<String> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Poisoned => return Err(ProtocolError::SessionPoisoned.into()),
            SessionState::Closed => {
                return Err(ProtocolError::NotRunning {
                    state: "closed".to_string(),
                }
                .into())
            }
        }

        let delimiter = Delimiter::generate();
        let script = protocol::build_script(
            &ScriptParts {
                args: &invocation.args,
                env: &invocation.env,
                cwd: invocation.cwd.as_deref(),
                quoting: invocation.quoting,
                escape_env_values: self.escape_env_values,
            },
            &delimiter,
        );

        info!("    + {}", invocation.command_line());

        // From here until the footer, any failure leaves the stream mid-frame.
        self.state = SessionState::Poisoned;
        self.send(&script)?;
        let deadline = deadline.map(|limit| (Instant::now() + limit, limit));
        let (status, captured) =
            self.read_frame(&delimiter, invocation.capture_output, sink, deadline)?;
        self.state = SessionState::Ready;
        debug!(status, "Command finished");

        // Streamed bytes go to the sink untouched; captured text must decode exactly.
        let output = String::from_utf8(captured)
            .map_err(|source| ProtocolError::InvalidOutput { status, source })?;

        if status != 0 {
            return Err(ExecutionError {
                status,
                args: invocation.args.clone(),
                output: invocation.capture_output.then_some(output),
            }
            .into());
        }
        Ok(output)
    }

    fn send(&mut self, script: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProtocolError::NotRunning {
                state: "closed".to_string(),
            })?;
        stdin
            .write_all(script.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(ProtocolError::Channel)?;
        Ok(())
    }

    fn read_frame(
        &mut self,
        delimiter: &Delimiter,
        capture: bool,
        sink: &mut dyn Write,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(u16, Vec<u8>)> {
        let mut captured = Vec::new();
        loop {
            let line = self.next_line(deadline)?;
            match protocol::scan_line(&line, delimiter)? {
                Frame::Output => emit(&line, capture, &mut captured, sink)?,
                Frame::Footer { output, status } => {
                    emit(output, capture, &mut captured, sink)?;
                    return Ok((status, captured));
                }
            }
        }
    }

    fn next_line(&self, deadline: Option<(Instant, Duration)>) -> Result<Vec<u8>> {
        let received = match deadline {
            None => self.lines.recv().map_err(|_| ProtocolError::MissingFooter)?,
            Some((expires, limit)) => {
                let remaining = expires.saturating_duration_since(Instant::now());
                match self.lines.recv_timeout(remaining) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(ProtocolError::DeadlineExceeded {
                            millis: limit.as_millis(),
                        }
                        .into())
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(ProtocolError::MissingFooter.into())
                    }
                }
            }
        };
        Ok(received.map_err(ProtocolError::Channel)?)
    }

    /// Close stdin, terminate and reap the shell. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;

        // EOF lets a well-behaved shell exit on its own
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                debug!("Flushing shell stdin on close failed: {}", e);
            }
        }

        match self.child.kill() {
            Ok(()) => {}
            // already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => warn!("Failed to terminate shell process: {}", e),
        }
        let status = self.child.wait().map_err(ProtocolError::Channel)?;
        debug!(?status, "Persistent shell exited");

        // A grandchild may still hold the pipe open; never block on the reader.
        if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                if reader.join().is_err() {
                    warn!("Shell reader thread panicked");
                }
            } else {
                debug!("Detaching shell reader thread");
            }
        }
        Ok(())
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close shell session: {}", e);
        }
    }
}

/// Route command output to the capture buffer or the live sink
fn emit(
    bytes: &[u8],
    capture: bool,
    captured: &mut Vec<u8>,
    sink: &mut dyn Write,
) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    if capture {
        captured.extend_from_slice(bytes);
        Ok(())
    } else {
        sink.write_all(bytes)?;
        sink.flush()
    }
}

fn pump_lines<R: Read>(stdout: R, tx: mpsc::Sender<LineResult>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}
