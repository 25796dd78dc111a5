//! The generic multi-language REPL driver.
//!
//! An agent hands the [`InterpreterRegistry`] a language name and gets back a
//! [`Session`]: one long-lived interpreter process whose stdout/stderr are
//! demultiplexed into a single stream of [`ExecutionEvent`]s. Code blocks are
//! instrumented by a per-language [`LanguageKit`] before submission so the
//! driver can report which original source line is executing and when the
//! block finished.
//!
//! Key components:
//! - `kit` -- the preprocessing contract and marker wire format
//! - `lang` -- one kit implementation per supported language
//! - `session` -- process lifecycle, reader threads, event queue, restarts
//! - `registry` -- language lookup and optional container wiring
//!
//! [`ExecutionEvent`]: crucible_core::types::ExecutionEvent

pub mod kit;
pub mod lang;
pub mod registry;
pub mod session;

pub use kit::{kit_for, LanguageKit};
pub use registry::{InterpreterRegistry, RegistryError};
pub use session::{EventStream, Session};
