use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExecutionEvent
// ---------------------------------------------------------------------------

/// One unit of progress streamed back to the agent loop while a code block
/// runs inside an interpreter session.
///
/// Events arrive in emission order per stream; `ActiveLine` and `Output`
/// may interleave, and `EndOfExecution` is always the final event of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The 1-based source line currently executing.
    ActiveLine(u32),
    /// A line of program output (stdout or stderr origin).
    Output(String),
    /// The submitted block finished running.
    EndOfExecution,
}

impl ExecutionEvent {
    /// The flat record consumed by the calling agent loop: exactly one of
    /// `active_line`, `output`, or `end_of_execution` is present.
    pub fn to_message(&self) -> serde_json::Value {
        match self {
            ExecutionEvent::ActiveLine(n) => serde_json::json!({ "active_line": n }),
            ExecutionEvent::Output(text) => serde_json::json!({ "output": text }),
            ExecutionEvent::EndOfExecution => serde_json::json!({ "end_of_execution": true }),
        }
    }

    /// Returns `true` for the terminal event of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::EndOfExecution)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state shared by interpreter sessions and the shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    /// The child process died underneath us; a restart may follow.
    Crashed,
    /// A command exceeded its deadline; the session refuses further work
    /// until explicitly restarted.
    TimedOut,
    /// Explicitly terminated.
    Stopped,
}

impl SessionState {
    /// Returns `true` when a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::NotStarted, SessionState::Running)
                | (SessionState::Running, SessionState::Crashed)
                | (SessionState::Running, SessionState::TimedOut)
                | (SessionState::Running, SessionState::Stopped)
                | (SessionState::Crashed, SessionState::Running)
                | (SessionState::Crashed, SessionState::Stopped)
                | (SessionState::TimedOut, SessionState::Running)
                | (SessionState::TimedOut, SessionState::Stopped)
                | (SessionState::Stopped, SessionState::Running)
        )
    }

    /// Whether the session can accept a new command in this state.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

// ---------------------------------------------------------------------------
// TerminalMode
// ---------------------------------------------------------------------------

/// How the shell session is wired to its child process. Decided once at
/// `start()` and threaded through every subsequent `run()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMode {
    /// A pseudo-terminal pair; command output and stderr share one stream.
    Pty,
    /// Plain stdin/stdout/stderr pipes (PTY allocation unavailable).
    Pipe,
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Languages the interpreter registry knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Shell,
    JavaScript,
    R,
    PowerShell,
    AppleScript,
    Html,
}

impl Language {
    /// Case-insensitive lookup, including the aliases the agent loop uses
    /// (`"bash"` and `"shell"` both mean the shell binding).
    pub fn from_name(name: &str) -> Option<Language> {
        match name.trim().to_lowercase().as_str() {
            "python" => Some(Language::Python),
            "shell" | "bash" | "sh" | "zsh" => Some(Language::Shell),
            "javascript" | "js" | "node" => Some(Language::JavaScript),
            "r" => Some(Language::R),
            "powershell" | "pwsh" => Some(Language::PowerShell),
            "applescript" => Some(Language::AppleScript),
            "html" => Some(Language::Html),
            _ => None,
        }
    }

    /// Canonical registry key for this language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Shell => "shell",
            Language::JavaScript => "javascript",
            Language::R => "r",
            Language::PowerShell => "powershell",
            Language::AppleScript => "applescript",
            Language::Html => "html",
        }
    }

    /// All supported bindings, in registry listing order.
    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::Shell,
            Language::JavaScript,
            Language::R,
            Language::PowerShell,
            Language::AppleScript,
            Language::Html,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_message_shape() {
        assert_eq!(
            ExecutionEvent::ActiveLine(3).to_message(),
            serde_json::json!({ "active_line": 3 })
        );
        assert_eq!(
            ExecutionEvent::Output("hi".into()).to_message(),
            serde_json::json!({ "output": "hi" })
        );
        assert_eq!(
            ExecutionEvent::EndOfExecution.to_message(),
            serde_json::json!({ "end_of_execution": true })
        );
    }

    #[test]
    fn language_aliases_fold_case() {
        assert_eq!(Language::from_name("Python"), Some(Language::Python));
        assert_eq!(Language::from_name("BASH"), Some(Language::Shell));
        assert_eq!(Language::from_name("shell"), Some(Language::Shell));
        assert_eq!(Language::from_name("JavaScript"), Some(Language::JavaScript));
        assert_eq!(Language::from_name("ruby"), None);
    }

    #[test]
    fn state_transitions() {
        use SessionState::*;
        assert!(NotStarted.can_transition_to(&Running));
        assert!(Running.can_transition_to(&Crashed));
        assert!(Crashed.can_transition_to(&Running));
        assert!(TimedOut.can_transition_to(&Running));
        assert!(!NotStarted.can_transition_to(&Crashed));
        assert!(!TimedOut.can_transition_to(&TimedOut));
    }
}
