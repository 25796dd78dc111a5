//! End-to-end session tests against real interpreters. They assume `python3`
//! and `/bin/bash` are on the path, which holds everywhere CI runs.

use std::sync::Arc;

use crucible_core::config::InterpreterConfig;
use crucible_core::types::{ExecutionEvent, Language, SessionState};
use crucible_interp::lang::shell::ShellKit;
use crucible_interp::{InterpreterRegistry, LanguageKit, Session};

fn registry() -> InterpreterRegistry {
    InterpreterRegistry::new(InterpreterConfig::default())
}

/// Bash pinned explicitly; the error trap needs a shell that understands
/// `set -E`.
fn bash_session() -> Session {
    let kit = Arc::new(ShellKit {
        shell: Some("/bin/bash".into()),
    });
    Session::new(kit, InterpreterConfig::default(), None)
}

fn collect(events: crucible_interp::EventStream<'_>) -> Vec<ExecutionEvent> {
    events.collect()
}

#[test]
fn python_streams_markers_interleaved_with_output() {
    let mut session = registry().create("python").expect("create python");
    let events = collect(session.run("print(1)\nprint(2)"));

    assert_eq!(
        events,
        vec![
            ExecutionEvent::ActiveLine(1),
            ExecutionEvent::Output("1".into()),
            ExecutionEvent::ActiveLine(2),
            ExecutionEvent::Output("2".into()),
            ExecutionEvent::EndOfExecution,
        ]
    );
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn python_session_is_reused_across_runs() {
    let mut session = registry().create("python").expect("create python");

    let first = collect(session.run("x = 41"));
    assert!(first.iter().any(ExecutionEvent::is_terminal));

    // State set by the first run must still be visible to the second.
    let second = collect(session.run("print(x + 1)"));
    assert!(second.contains(&ExecutionEvent::Output("42".into())));
}

#[test]
fn shell_error_reports_the_failing_line_then_completes() {
    let mut session = bash_session();
    let events = collect(session.run("false"));

    assert_eq!(events.first(), Some(&ExecutionEvent::ActiveLine(1)));
    assert!(
        events.iter().any(|e| matches!(
            e,
            ExecutionEvent::Output(text) if text.contains("An error occurred on line")
        )),
        "expected the trap's diagnostic, got: {events:?}"
    );
    assert_eq!(events.last(), Some(&ExecutionEvent::EndOfExecution));
    assert_eq!(
        events.iter().filter(|e| e.is_terminal()).count(),
        1,
        "exactly one terminal event per run"
    );

    // The trap exits the shell; the session notices and replaces it on the
    // next submission without burning retry budget.
    assert_eq!(session.state(), SessionState::Crashed);
    let events = collect(session.run("echo recovered"));
    assert!(events.contains(&ExecutionEvent::Output("recovered".into())));
    assert_eq!(events.last(), Some(&ExecutionEvent::EndOfExecution));
}

#[test]
fn interpreter_death_between_runs_is_recovered() {
    let mut session = registry().create("python").expect("create python");

    // `exit()` takes the REPL down mid-run; end-of-stream still terminates
    // the event sequence.
    let events = collect(session.run("exit()"));
    assert_eq!(events.last(), Some(&ExecutionEvent::EndOfExecution));

    let events = collect(session.run("print(3)"));
    assert!(events.contains(&ExecutionEvent::Output("3".into())));
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn dropping_the_stream_keeps_the_process_alive() {
    let mut session = registry().create("python").expect("create python");

    let mut events = session.run("print('a')\nprint('b')");
    let first = events.next().expect("stream should yield at least one event");
    assert_eq!(first, ExecutionEvent::ActiveLine(1));
    events.close();

    // Give the abandoned run's remaining lines time to reach the queue, then
    // check the next run discards them.
    std::thread::sleep(std::time::Duration::from_millis(300));
    let events = collect(session.run("print('c')"));
    assert!(events.contains(&ExecutionEvent::Output("c".into())));
    assert!(!events.contains(&ExecutionEvent::Output("a".into())));
    assert!(!events.contains(&ExecutionEvent::Output("b".into())));
}

#[test]
fn terminate_then_rerun_starts_fresh() {
    let mut session = registry().create("python").expect("create python");
    let _ = collect(session.run("y = 1"));

    session.terminate();
    assert_eq!(session.state(), SessionState::Stopped);

    // A fresh process has no memory of the terminated one.
    let events = collect(session.run("print('y' in dir())"));
    assert!(events.contains(&ExecutionEvent::Output("False".into())));
}

#[test]
fn html_runs_one_shot_through_the_session() {
    let mut session = registry().create("html").expect("create html");
    let events = collect(session.run("<p>hello</p>"));

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ExecutionEvent::Output(_)));
    assert!(events[1].is_terminal());
}

/// An interpreter that exits without reading: every stdin write larger than
/// the pipe buffer fails, so each attempt burns one restart.
struct MoribundKit;

impl LanguageKit for MoribundKit {
    fn language(&self) -> Language {
        Language::Shell
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec!["/bin/true".into()])
    }

    fn preprocess(&self, code: &str) -> String {
        code.to_string()
    }
}

#[test]
fn exhausted_restarts_end_with_a_terminal_output_event() {
    let mut session = Session::new(Arc::new(MoribundKit), InterpreterConfig::default(), None);
    // Larger than any pipe buffer, so the write cannot land before the
    // process is gone.
    let code = "x".repeat(1 << 20);
    let events = collect(session.run(&code));

    assert_eq!(events.last(), Some(&ExecutionEvent::EndOfExecution));
    assert!(events.contains(&ExecutionEvent::Output(
        "Maximum retries reached. Could not execute code.".into()
    )));

    // The first failed attempt is silent; notices start at the second.
    let notices: Vec<&ExecutionEvent> = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::Output(t) if t.starts_with("Retrying")))
        .collect();
    assert_eq!(notices.len(), 2, "events: {events:?}");
    assert!(
        matches!(notices[0], ExecutionEvent::Output(t) if t.contains("attempt 2 of 3")),
        "events: {events:?}"
    );
    assert_eq!(session.state(), SessionState::Crashed);
}

#[test]
fn marker_text_in_user_output_does_not_end_the_run_early() {
    let mut session = registry().create("python").expect("create python");
    // A program that prints the literal end marker itself: the run must
    // still carry on to the real end and terminate exactly once.
    let events = collect(session.run("print('## end_of_execution ##')\nprint('after')"));

    assert!(events.contains(&ExecutionEvent::Output("after".into())));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(events.last(), Some(&ExecutionEvent::EndOfExecution));
}
