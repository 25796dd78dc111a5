use crucible_core::types::Language;

use crate::kit::{active_line_marker, LanguageKit, END_OF_EXECUTION_MARKER};

/// The user's shell (`CRUCIBLE_SHELL`/`SHELL`, `cmd.exe` on Windows) driven
/// through a stdin pipe.
///
/// Failures are trapped with `trap ... ERR` so the driver still learns which
/// line broke; the trap exits the shell, which the session observes as
/// end-of-stream and treats as completion.
#[derive(Default)]
pub struct ShellKit {
    /// Shell binary override; `CRUCIBLE_SHELL`/`SHELL` decide when unset.
    pub shell: Option<String>,
}

impl LanguageKit for ShellKit {
    fn language(&self) -> Language {
        Language::Shell
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec![self
            .shell
            .clone()
            .unwrap_or_else(crucible_core::env::default_shell)])
    }

    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        // -E propagates the ERR trap into functions and subshells.
        out.push_str("set -E\n");
        out.push_str("trap 'echo \"An error occurred on line $LINENO\"; exit' ERR\n");
        for (i, line) in code.lines().enumerate() {
            out.push_str(&format!(
                "echo \"{}\"\n",
                active_line_marker(i as u32 + 1)
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("echo \"{END_OF_EXECUTION_MARKER}\"\n"));
        out
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        let text = line.trim_end();
        if text.trim().is_empty() {
            return None;
        }
        Some(text.to_string())
    }
}
