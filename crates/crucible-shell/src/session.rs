use std::io::{Read as IoRead, Write as IoWrite};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crucible_core::config::ShellConfig;
use crucible_core::types::{SessionState, TerminalMode};
use crucible_telemetry::metrics::{self, SHELL_COMMANDS_TOTAL, SHELL_TIMEOUTS_TOTAL};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delimits where one command's output ends on the shared stream. Fixed for
/// the life of the process.
pub const SENTINEL: &str = "<<exit>>";

/// Read slice while waiting for output; every suspension is bounded by the
/// call's overall deadline.
const READ_TICK: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("shell session has not been started")]
    NotStarted,

    #[error("shell session must be restarted before running further commands")]
    MustRestart,

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("shell spawn failed: {0}")]
    SpawnFailed(String),

    #[error("shell I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;

// ---------------------------------------------------------------------------
// CommandOutput
// ---------------------------------------------------------------------------

/// What one command produced. In PTY mode stderr shares the terminal with
/// stdout, so `error` is always empty there; pipe mode captures it
/// separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

enum Backend {
    Pty {
        child: Box<dyn portable_pty::Child + Send + Sync>,
        _master: Box<dyn portable_pty::MasterPty + Send>,
        writer: Box<dyn IoWrite + Send>,
        output: flume::Receiver<Vec<u8>>,
    },
    Pipe {
        child: std::process::Child,
        stdin: std::process::ChildStdin,
        stdout: flume::Receiver<Vec<u8>>,
        stderr: flume::Receiver<Vec<u8>>,
    },
}

impl Backend {
    fn mode(&self) -> TerminalMode {
        match self {
            Backend::Pty { .. } => TerminalMode::Pty,
            Backend::Pipe { .. } => TerminalMode::Pipe,
        }
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            Backend::Pty { writer, .. } => {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
                writer.flush()
            }
            Backend::Pipe { stdin, .. } => {
                stdin.write_all(line.as_bytes())?;
                stdin.write_all(b"\n")?;
                stdin.flush()
            }
        }
    }

    fn stdout_rx(&self) -> &flume::Receiver<Vec<u8>> {
        match self {
            Backend::Pty { output, .. } => output,
            Backend::Pipe { stdout, .. } => stdout,
        }
    }

    fn kill(&mut self) {
        match self {
            Backend::Pty { child, .. } => {
                let _ = child.kill();
                let _ = child.wait();
            }
            Backend::Pipe { child, .. } => {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Chunked byte pump from a blocking reader into a channel. Exits on EOF or
/// when the session drops the receiver.
fn spawn_chunk_reader<R>(mut reader: R, tx: flume::Sender<Vec<u8>>, stream: &'static str)
where
    R: IoRead + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // EIO from a PTY master is the normal end-of-life signal.
                    if e.kind() != std::io::ErrorKind::Other {
                        debug!(stream, "shell reader error: {e}");
                    }
                    break;
                }
            }
        }
        debug!(stream, "shell reader exiting");
    });
}

// ---------------------------------------------------------------------------
// ShellSession
// ---------------------------------------------------------------------------

/// A long-lived interactive shell, PTY-backed when the platform allows it.
///
/// Commands are delimited with the [`SENTINEL`] echoed on the same stream as
/// the command's own output. One command may be outstanding at a time; a
/// command that outlives its deadline leaves the session in `TimedOut`, and
/// only [`ShellSession::restart`] makes it usable again.
pub struct ShellSession {
    config: ShellConfig,
    state: SessionState,
    backend: Option<Backend>,
    listener: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl ShellSession {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            state: SessionState::NotStarted,
            backend: None,
            listener: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Which wiring `start()` ended up with, once started.
    pub fn mode(&self) -> Option<TerminalMode> {
        self.backend.as_ref().map(Backend::mode)
    }

    /// Receive each output chunk as it arrives, ahead of the buffered result.
    pub fn set_listener(&mut self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listener = Some(Arc::new(listener));
    }

    fn shell_binary(&self) -> String {
        self.config
            .shell
            .clone()
            .unwrap_or_else(crucible_core::env::default_shell)
    }

    /// Spawn the shell, preferring a PTY and falling back to plain pipes
    /// when allocation fails.
    pub fn start(&mut self) -> Result<()> {
        let shell = self.shell_binary();
        match self.start_pty(&shell) {
            Ok(backend) => self.finish_start(backend, &shell),
            Err(e) => {
                warn!(%shell, error = %e, "pty allocation failed, falling back to pipes");
                let backend = self.start_pipe(&shell)?;
                self.finish_start(backend, &shell)
            }
        }
    }

    /// Spawn with an explicit wiring instead of the PTY-first probe.
    pub fn start_with_mode(&mut self, mode: TerminalMode) -> Result<()> {
        let shell = self.shell_binary();
        let backend = match mode {
            TerminalMode::Pty => self.start_pty(&shell)?,
            TerminalMode::Pipe => self.start_pipe(&shell)?,
        };
        self.finish_start(backend, &shell)
    }

    fn finish_start(&mut self, backend: Backend, shell: &str) -> Result<()> {
        info!(%shell, mode = ?backend.mode(), "shell session started");
        self.backend = Some(backend);
        self.state = SessionState::Running;
        if self.mode() == Some(TerminalMode::Pty) {
            self.quiesce_terminal()?;
        }
        Ok(())
    }

    fn start_pty(&self, shell: &str) -> Result<Backend> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;

        let mut command = CommandBuilder::new(shell);
        // Line editors re-echo input themselves, so `stty -echo` alone does
        // not silence a shell running readline or zle. Editing is useless on
        // a non-interactive master anyway.
        let base = std::path::Path::new(shell)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(shell);
        if base == "bash" {
            command.arg("--noediting");
        }
        if base == "zsh" {
            command.arg("--no-zle");
        }
        command.env("TERM", "dumb");
        command.env("PS1", "");

        // spawn_command puts the child in its own session with the slave as
        // controlling terminal.
        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;
        debug!(%shell, "spawned shell on pty");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;

        let (tx, rx) = flume::bounded::<Vec<u8>>(256);
        spawn_chunk_reader(reader, tx, "pty");

        Ok(Backend::Pty {
            child,
            _master: pair.master,
            writer,
            output: rx,
        })
    }

    fn start_pipe(&self, shell: &str) -> Result<Backend> {
        let mut command = std::process::Command::new(shell);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;
        debug!(%shell, "spawned shell on pipes");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ShellError::SpawnFailed("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShellError::SpawnFailed("child stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ShellError::SpawnFailed("child stderr unavailable".into()))?;

        let (out_tx, out_rx) = flume::bounded::<Vec<u8>>(256);
        let (err_tx, err_rx) = flume::bounded::<Vec<u8>>(256);
        spawn_chunk_reader(stdout, out_tx, "stdout");
        spawn_chunk_reader(stderr, err_tx, "stderr");

        Ok(Backend::Pipe {
            child,
            stdin,
            stdout: out_rx,
            stderr: err_rx,
        })
    }

    /// Turn off terminal echo and the prompt, then drain the resulting
    /// chatter. With echo left on, the terminal would reflect every command
    /// we type back at us, sentinel included, before the command even runs.
    fn quiesce_terminal(&mut self) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(ShellError::NotStarted);
        };
        backend.write_line("stty -echo; unset PROMPT_COMMAND; PS1=''")?;

        let rx = backend.stdout_rx().clone();
        let mut quiet_ticks = 0u32;
        for _ in 0..30 {
            match rx.recv_timeout(READ_TICK) {
                Ok(_) => quiet_ticks = 0,
                Err(flume::RecvTimeoutError::Timeout) => {
                    quiet_ticks += 1;
                    if quiet_ticks >= 2 {
                        break;
                    }
                }
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    /// Run one command under the configured deadline.
    pub async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let timeout = Duration::from_secs(self.config.command_timeout_secs);
        self.run_with_timeout(command, timeout).await
    }

    /// Run one command under an explicit deadline.
    ///
    /// On timeout the session transitions to `TimedOut` and refuses further
    /// commands until [`ShellSession::restart`]: the half-finished command is
    /// still holding the terminal, so there is no safe way to submit another.
    pub async fn run_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        match self.state {
            SessionState::Running => {}
            SessionState::TimedOut | SessionState::Crashed => return Err(ShellError::MustRestart),
            SessionState::NotStarted | SessionState::Stopped => return Err(ShellError::NotStarted),
        }
        metrics::global().increment_counter(SHELL_COMMANDS_TOTAL, &[]);

        let listener = self.listener.clone();
        let Some(backend) = self.backend.as_mut() else {
            return Err(ShellError::NotStarted);
        };
        let mode = backend.mode();
        backend.write_line(&format!("{command}; echo '{SENTINEL}'"))?;

        let rx = backend.stdout_rx().clone();
        let deadline = Instant::now() + timeout;
        let mut captured: Vec<u8> = Vec::new();
        let mut forwarded = 0usize;
        let mut exited_early = false;

        let sentinel_pos = loop {
            if let Some(pos) = find_sentinel(&captured) {
                break Some(pos);
            }
            // Forward what cannot be part of a sentinel yet; the last
            // `SENTINEL.len() - 1` bytes are held back until more input
            // decides whether they start one.
            if let Some(listener) = &listener {
                let safe = captured.len().saturating_sub(SENTINEL.len() - 1);
                if safe > forwarded {
                    listener(&String::from_utf8_lossy(&captured[forwarded..safe]));
                    forwarded = safe;
                }
            }
            if exited_early {
                break None;
            }
            let now = Instant::now();
            if now >= deadline {
                self.state = SessionState::TimedOut;
                metrics::global().increment_counter(SHELL_TIMEOUTS_TOTAL, &[]);
                warn!(?timeout, "shell command timed out");
                return Err(ShellError::Timeout(timeout));
            }
            let slice = (deadline - now).min(READ_TICK);
            match tokio::time::timeout(slice, rx.recv_async()).await {
                Ok(Ok(chunk)) => captured.extend_from_slice(&chunk),
                Ok(Err(_)) => {
                    // EOF without a sentinel: the shell itself went away.
                    exited_early = true;
                }
                Err(_elapsed) => {}
            }
        };

        match sentinel_pos {
            Some(pos) => {
                if let Some(listener) = &listener {
                    if pos > forwarded {
                        listener(&String::from_utf8_lossy(&captured[forwarded..pos]));
                    }
                }
                captured.truncate(pos);
            }
            None => {
                self.state = SessionState::Crashed;
                return Err(ShellError::Io(std::io::Error::other(
                    "shell exited before the command completed",
                )));
            }
        }

        let output = match mode {
            TerminalMode::Pty => sanitize_terminal(&String::from_utf8_lossy(&captured)),
            TerminalMode::Pipe => String::from_utf8_lossy(&captured).into_owned(),
        };
        let error = match self.backend.as_ref() {
            Some(Backend::Pipe { stderr, .. }) => {
                let mut bytes = Vec::new();
                while let Ok(chunk) = stderr.try_recv() {
                    bytes.extend_from_slice(&chunk);
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
            _ => String::new(),
        };

        Ok(CommandOutput {
            output: strip_one_trailing_newline(&output),
            error: strip_one_trailing_newline(&error),
        })
    }

    /// Terminate the process and release the terminal.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Err(ShellError::NotStarted);
        };
        backend.kill();
        self.state = SessionState::Stopped;
        info!("shell session stopped");
        Ok(())
    }

    /// Stop and recreate the session; the only way out of `TimedOut`.
    pub fn restart(&mut self) -> Result<()> {
        if let Some(mut backend) = self.backend.take() {
            backend.kill();
        }
        self.state = SessionState::Stopped;
        self.start()
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.kill();
        }
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("state", &self.state)
            .field("mode", &self.mode())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Find the real sentinel in captured terminal bytes.
///
/// A terminal that is still echoing reflects the submitted line, where the
/// sentinel sits inside its single quotes; those occurrences are skipped so
/// only the `echo` command's own output ends the command.
fn find_sentinel(haystack: &[u8]) -> Option<usize> {
    let needle = SENTINEL.as_bytes();
    let mut from = 0;
    while let Some(off) = find_subslice(&haystack[from..], needle) {
        let pos = from + off;
        if pos > 0 && haystack[pos - 1] == b'\'' {
            from = pos + 1;
            continue;
        }
        return Some(pos);
    }
    None
}

/// Strip ANSI escape sequences and normalize line endings from raw terminal
/// bytes.
fn sanitize_terminal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            // CSI: parameters then one final byte in 0x40..=0x7e.
            Some('[') => {
                chars.next();
                while let Some(&n) = chars.peek() {
                    chars.next();
                    if ('\u{40}'..='\u{7e}').contains(&n) {
                        break;
                    }
                }
            }
            // OSC: terminated by BEL or ESC-backslash.
            Some(']') => {
                chars.next();
                while let Some(n) = chars.next() {
                    if n == '\u{7}' {
                        break;
                    }
                    if n == '\u{1b}' {
                        if chars.peek() == Some(&'\\') {
                            chars.next();
                        }
                        break;
                    }
                }
            }
            _ => {
                chars.next();
            }
        }
    }
    out.replace("\r\n", "\n").replace('\r', "")
}

fn strip_one_trailing_newline(text: &str) -> String {
    text.strip_suffix('\n').unwrap_or(text).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_search_finds_split_boundaries() {
        assert_eq!(find_sentinel(b"hi\n<<exit>>\n"), Some(3));
        assert_eq!(find_sentinel(b"no marker here"), None);
        assert_eq!(find_sentinel(b""), None);
    }

    #[test]
    fn sentinel_search_skips_the_quoted_command_echo() {
        // An echoing terminal reflects the submitted line first; the match
        // must land on the echo command's output, not on the reflection.
        let buf = b"echo hi; echo '<<exit>>'\r\nhi\r\n<<exit>>\r\n";
        let pos = find_sentinel(buf).expect("real sentinel present");
        assert_eq!(&buf[pos..pos + SENTINEL.len()], SENTINEL.as_bytes());
        assert_eq!(pos, 30);
        // Reflection only, command still running: no match at all.
        assert_eq!(find_sentinel(b"sleep 5; echo '<<exit>>'\r\n"), None);
    }

    #[test]
    fn sanitize_drops_escapes_and_carriage_returns() {
        let raw = "\u{1b}[?2004hhi\r\n\u{1b}]0;title\u{7}done\r\n";
        assert_eq!(sanitize_terminal(raw), "hi\ndone\n");
    }

    #[test]
    fn only_one_trailing_newline_is_stripped() {
        assert_eq!(strip_one_trailing_newline("hi\n"), "hi");
        assert_eq!(strip_one_trailing_newline("hi\n\n"), "hi\n");
        assert_eq!(strip_one_trailing_newline("hi"), "hi");
        assert_eq!(strip_one_trailing_newline(""), "");
    }
}
