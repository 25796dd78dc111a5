use std::sync::Arc;

use crucible_core::types::{ExecutionEvent, Language};

use crate::lang;

// ---------------------------------------------------------------------------
// Marker wire format
// ---------------------------------------------------------------------------

/// Prefix of the interpreter-emitted line reporting the active source line.
pub const ACTIVE_LINE_PREFIX: &str = "## active_line ";
/// Suffix closing an active-line marker.
pub const ACTIVE_LINE_SUFFIX: &str = " ##";
/// Literal marker a preprocessed program emits as its last action.
///
/// Markers are fixed literals. User code that prints this exact text will be
/// taken for the real marker; the agent loop pattern-matches on these strings
/// so they are not randomised per session.
pub const END_OF_EXECUTION_MARKER: &str = "## end_of_execution ##";

/// Render the marker for a 1-based source line number.
pub fn active_line_marker(line: u32) -> String {
    format!("{ACTIVE_LINE_PREFIX}{line}{ACTIVE_LINE_SUFFIX}")
}

/// Extract the line number from a line containing an active-line marker.
pub fn parse_active_line(line: &str) -> Option<u32> {
    let start = line.find(ACTIVE_LINE_PREFIX)? + ACTIVE_LINE_PREFIX.len();
    let rest = &line[start..];
    let end = rest.find(ACTIVE_LINE_SUFFIX)?;
    rest[..end].trim().parse().ok()
}

// ---------------------------------------------------------------------------
// LanguageKit trait
// ---------------------------------------------------------------------------

/// The per-language contract the session driver speaks: how to spawn the
/// interpreter, how to instrument a code block, and how to decode its output
/// stream.
///
/// Implementations are selected through [`kit_for`], never through runtime
/// probing. All operations are pure except [`LanguageKit::one_shot`].
pub trait LanguageKit: Send + Sync {
    /// Which language binding this kit implements.
    fn language(&self) -> Language;

    /// The REPL command to spawn (program followed by arguments), or `None`
    /// for degenerate non-REPL bindings executed via [`LanguageKit::one_shot`].
    fn repl_command(&self) -> Option<Vec<String>>;

    /// Rewrite `code` into an instrumented program: an active-line marker
    /// printed before each original line (1-based, increasing by one), the
    /// end-of-execution marker as the final action, and the language's native
    /// error trap so uncaught failures still reach the end marker.
    fn preprocess(&self, code: &str) -> String;

    /// The line number if `line` contains an active-line marker.
    fn detect_active_line(&self, line: &str) -> Option<u32> {
        parse_active_line(line)
    }

    /// True iff `line` contains the end-of-execution marker.
    fn detect_end_of_execution(&self, line: &str) -> bool {
        line.contains(END_OF_EXECUTION_MARKER)
    }

    /// Per-language noise filter applied before a line reaches the event
    /// queue. `None` drops the line entirely (REPL banners, echoed prompts).
    fn postprocess_line(&self, line: &str) -> Option<String> {
        Some(line.to_string())
    }

    /// Synchronous single-result execution for bindings without a REPL
    /// (HTML). Returns the full event sequence, ending in `EndOfExecution`.
    fn one_shot(&self, _code: &str) -> Option<Vec<ExecutionEvent>> {
        None
    }
}

/// Select the kit for a language.
pub fn kit_for(language: Language) -> Arc<dyn LanguageKit> {
    match language {
        Language::Python => Arc::new(lang::python::PythonKit),
        Language::Shell => Arc::new(lang::shell::ShellKit::default()),
        Language::JavaScript => Arc::new(lang::javascript::JavaScriptKit),
        Language::R => Arc::new(lang::r::RKit),
        Language::PowerShell => Arc::new(lang::powershell::PowerShellKit),
        Language::AppleScript => Arc::new(lang::applescript::AppleScriptKit),
        Language::Html => Arc::new(lang::html::HtmlKit),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_roundtrip() {
        for n in [1u32, 7, 120] {
            let marker = active_line_marker(n);
            assert_eq!(parse_active_line(&marker), Some(n));
        }
    }

    #[test]
    fn marker_detected_inside_noise() {
        assert_eq!(parse_active_line(">>> ## active_line 4 ##"), Some(4));
        assert_eq!(parse_active_line("plain output"), None);
        assert_eq!(parse_active_line("## active_line x ##"), None);
    }

    #[test]
    fn every_language_has_a_kit() {
        for lang in Language::all() {
            let kit = kit_for(*lang);
            assert_eq!(kit.language(), *lang);
        }
    }
}
