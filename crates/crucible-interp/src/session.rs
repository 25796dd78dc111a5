use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crucible_core::config::InterpreterConfig;
use crucible_core::types::{ExecutionEvent, Language, SessionState};
use crucible_telemetry::metrics::{self, INTERP_EXECUTIONS_TOTAL, INTERP_RESTARTS_TOTAL};
use tracing::{debug, info, warn};

use crate::kit::LanguageKit;

// ---------------------------------------------------------------------------
// ContainerContext
// ---------------------------------------------------------------------------

/// Container-backend wiring handed to a session by the registry: the shared
/// per-agent-session identifier, the idle timeout, and a callback invoked
/// once when the session closes so the caller can reclaim container
/// resources.
pub struct ContainerContext {
    pub session_id: String,
    pub idle_timeout: Option<u64>,
    on_close: Arc<dyn Fn(&str) + Send + Sync>,
}

impl ContainerContext {
    pub fn new(
        session_id: impl Into<String>,
        idle_timeout: Option<u64>,
        on_close: Arc<dyn Fn(&str) + Send + Sync>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            idle_timeout,
            on_close,
        }
    }

    fn notify_closed(&self) {
        (self.on_close)(&self.session_id);
    }
}

impl std::fmt::Debug for ContainerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerContext")
            .field("session_id", &self.session_id)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ChildProc
// ---------------------------------------------------------------------------

/// One interpreter child process: its stdin handle and the single queue fed
/// by the two reader threads. The receiver is exclusively owned here; the
/// borrow checker keeps it single-consumer.
struct ChildProc {
    child: Child,
    stdin: ChildStdin,
    events: flume::Receiver<ExecutionEvent>,
}

impl ChildProc {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decode one raw line from the child and feed the queue. Reader threads
/// exit when the stream hits EOF or the session drops the receiver.
fn spawn_reader<R>(
    reader: R,
    kit: Arc<dyn LanguageKit>,
    tx: flume::Sender<ExecutionEvent>,
    stream: &'static str,
) where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    debug!(stream, error = %e, "reader error");
                    break;
                }
            };
            // An interrupt unwinds the running command without the real end
            // marker ever printing; treat it as a soft completion.
            if stream == "stderr" && line.contains("KeyboardInterrupt") {
                if tx.send(ExecutionEvent::EndOfExecution).is_err() {
                    break;
                }
                continue;
            }
            let Some(text) = kit.postprocess_line(&line) else {
                continue;
            };
            let event = if let Some(n) = kit.detect_active_line(&text) {
                ExecutionEvent::ActiveLine(n)
            } else if kit.detect_end_of_execution(&text) {
                ExecutionEvent::EndOfExecution
            } else {
                ExecutionEvent::Output(text)
            };
            if tx.send(event).is_err() {
                break;
            }
        }
        debug!(stream, "reader thread exiting");
    });
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Owns one interpreter process's lifecycle, streams, and event queue.
///
/// The process is spawned lazily on the first `run` and replaced (the
/// `Session` itself survives) when it crashes. At most one `run` is in
/// flight at a time; the returned [`EventStream`] borrows the session
/// mutably, so a second submission is a compile error rather than a runtime
/// race.
pub struct Session {
    kit: Arc<dyn LanguageKit>,
    config: InterpreterConfig,
    state: SessionState,
    proc: Option<ChildProc>,
    container: Option<ContainerContext>,
    close_notified: bool,
}

impl Session {
    pub fn new(
        kit: Arc<dyn LanguageKit>,
        config: InterpreterConfig,
        container: Option<ContainerContext>,
    ) -> Self {
        Self {
            kit,
            config,
            state: SessionState::NotStarted,
            proc: None,
            container,
            close_notified: false,
        }
    }

    pub fn language(&self) -> Language {
        self.kit.language()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn container(&self) -> Option<&ContainerContext> {
        self.container.as_ref()
    }

    /// Submit a code block and stream back execution events.
    ///
    /// Spawn and write failures surface as `Output` events (the agent sees
    /// them as ordinary command output), never as panics or errors. A dead
    /// process is replaced automatically, up to the configured restart
    /// budget per call. Dropping the stream stops listening but leaves the
    /// process alive for the next call.
    pub fn run(&mut self, code: &str) -> EventStream<'_> {
        let language = self.kit.language();
        metrics::global()
            .increment_counter(INTERP_EXECUTIONS_TOTAL, &[("language", language.as_str())]);

        // Degenerate non-REPL bindings produce their whole event sequence
        // synchronously.
        if let Some(events) = self.kit.one_shot(code) {
            self.state = SessionState::Running;
            return EventStream::drained(self, events.into());
        }

        let instrumented = self.kit.preprocess(code);
        let mut pending: VecDeque<ExecutionEvent> = VecDeque::new();
        let mut restarts: u32 = 0;

        loop {
            // A process that died since the last run is replaced without
            // consuming the retry budget.
            if let Some(proc) = self.proc.as_mut() {
                if !proc.is_alive() {
                    debug!(%language, "interpreter process died since last run");
                    self.teardown_process();
                    self.state = SessionState::Crashed;
                }
            }

            if self.proc.is_none() {
                match self.spawn_process() {
                    Ok(proc) => {
                        self.proc = Some(proc);
                        self.state = SessionState::Running;
                    }
                    Err(e) => {
                        warn!(%language, error = %e, "failed to start interpreter");
                        pending.push_back(ExecutionEvent::Output(format!(
                            "Failed to start {language}: {e}"
                        )));
                        pending.push_back(ExecutionEvent::EndOfExecution);
                        return EventStream::drained(self, pending);
                    }
                }
            }

            let Some(proc) = self.proc.as_mut() else {
                continue;
            };
            // Discard events left over from a cancelled run before this
            // run's output starts arriving.
            while proc.events.try_recv().is_ok() {}
            let write_result = proc
                .stdin
                .write_all(instrumented.as_bytes())
                .and_then(|_| proc.stdin.write_all(b"\n"))
                .and_then(|_| proc.stdin.flush());

            match write_result {
                Ok(()) => break,
                Err(e) => {
                    restarts += 1;
                    metrics::global().increment_counter(
                        INTERP_RESTARTS_TOTAL,
                        &[("language", language.as_str())],
                    );
                    warn!(%language, attempt = restarts, error = %e, "stdin write failed; restarting interpreter");
                    self.teardown_process();
                    self.state = SessionState::Crashed;
                    if restarts > self.config.max_restarts {
                        pending.push_back(ExecutionEvent::Output(
                            "Maximum retries reached. Could not execute code.".to_string(),
                        ));
                        pending.push_back(ExecutionEvent::EndOfExecution);
                        return EventStream::drained(self, pending);
                    }
                    // The first failure is silent; later ones tell the agent
                    // a retry is happening.
                    if restarts > 1 {
                        pending.push_back(ExecutionEvent::Output(format!(
                            "Retrying... (attempt {} of {})",
                            restarts, self.config.max_restarts
                        )));
                    }
                }
            }
        }

        EventStream::streaming(self, pending)
    }

    /// Forcibly kill the underlying process. The next `run` starts fresh.
    pub fn terminate(&mut self) {
        info!(language = %self.kit.language(), "terminating interpreter session");
        self.teardown_process();
        self.state = SessionState::Stopped;
        self.notify_container_closed();
    }

    fn spawn_process(&self) -> std::io::Result<ChildProc> {
        let cmd = self
            .kit
            .repl_command()
            .ok_or_else(|| std::io::Error::other("language has no interpreter command"))?;
        debug!(command = ?cmd, "spawning interpreter");

        let mut child = Command::new(&cmd[0])
            .args(&cmd[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr unavailable"))?;

        let (tx, rx) = flume::unbounded();
        spawn_reader(stdout, Arc::clone(&self.kit), tx.clone(), "stdout");
        spawn_reader(stderr, Arc::clone(&self.kit), tx, "stderr");

        Ok(ChildProc {
            child,
            stdin,
            events: rx,
        })
    }

    fn teardown_process(&mut self) {
        if let Some(mut proc) = self.proc.take() {
            proc.kill();
        }
    }

    fn notify_container_closed(&mut self) {
        if self.close_notified {
            return;
        }
        self.close_notified = true;
        if let Some(ctx) = &self.container {
            ctx.notify_closed();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown_process();
        self.notify_container_closed();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("language", &self.kit.language())
            .field("state", &self.state)
            .field("process", &self.proc.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Finished,
}

/// Lazy event stream for one `run` call.
///
/// Dropping (or calling [`EventStream::close`]) detaches the consumer; the
/// interpreter process stays alive and reusable. The terminal
/// `EndOfExecution` event is always the last item yielded.
pub struct EventStream<'a> {
    session: &'a mut Session,
    pending: VecDeque<ExecutionEvent>,
    phase: Phase,
}

impl<'a> EventStream<'a> {
    fn streaming(session: &'a mut Session, pending: VecDeque<ExecutionEvent>) -> Self {
        Self {
            session,
            pending,
            phase: Phase::Streaming,
        }
    }

    fn drained(session: &'a mut Session, pending: VecDeque<ExecutionEvent>) -> Self {
        Self {
            session,
            pending,
            phase: Phase::Finished,
        }
    }

    /// Stop consuming. The underlying process is left running.
    pub fn close(self) {}

    /// After the end marker, spend a bounded number of short polls catching
    /// lines still in flight from the reader threads.
    fn drain_trailing(&mut self) {
        let poll = Duration::from_millis(self.session.config.poll_interval_ms);
        let mut polls_left = self.session.config.trailing_drain_polls;
        while polls_left > 0 {
            polls_left -= 1;
            let Some(proc) = self.session.proc.as_ref() else {
                break;
            };
            match proc.events.recv_timeout(poll) {
                // A duplicate marker can only come from user output that
                // contains the literal text; swallow it.
                Ok(ExecutionEvent::EndOfExecution) => {}
                Ok(ev) => self.pending.push_back(ev),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Iterator for EventStream<'_> {
    type Item = ExecutionEvent;

    fn next(&mut self) -> Option<ExecutionEvent> {
        if let Some(ev) = self.pending.pop_front() {
            if ev.is_terminal() {
                self.phase = Phase::Finished;
            }
            return Some(ev);
        }
        if self.phase == Phase::Finished {
            return None;
        }

        let poll = Duration::from_millis(self.session.config.poll_interval_ms);
        loop {
            let Some(proc) = self.session.proc.as_ref() else {
                self.phase = Phase::Finished;
                return Some(ExecutionEvent::EndOfExecution);
            };
            match proc.events.recv_timeout(poll) {
                Ok(ExecutionEvent::EndOfExecution) => {
                    self.drain_trailing();
                    self.pending.push_back(ExecutionEvent::EndOfExecution);
                    return self.next();
                }
                Ok(ev) => return Some(ev),
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => {
                    // The interpreter exited mid-run (shell ERR trap, hard
                    // crash). End-of-stream counts as completion; the next
                    // run spawns a fresh process.
                    self.session.teardown_process();
                    self.session.state = SessionState::Crashed;
                    self.phase = Phase::Finished;
                    return Some(ExecutionEvent::EndOfExecution);
                }
            }
        }
    }
}

impl std::fmt::Debug for EventStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("phase", &self.phase)
            .field("pending", &self.pending.len())
            .finish()
    }
}
