//! The persistent interactive shell surface.
//!
//! Where the interpreter driver scripts a batch of instrumented code into a
//! REPL, [`ShellSession`] hands the agent a real terminal: one long-lived
//! shell whose command boundaries are detected with a sentinel echoed onto
//! the output stream, under a strict per-command deadline.

pub mod session;

pub use session::{CommandOutput, ShellError, ShellSession, SENTINEL};
