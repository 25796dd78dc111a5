use crucible_core::types::Language;

use crate::kit::{active_line_marker, LanguageKit, END_OF_EXECUTION_MARKER};

/// R driven through `R -q --no-save --interactive`.
///
/// `--interactive` keeps the report-and-continue error behaviour even though
/// stdin is a pipe, so no extra trap is needed.
pub struct RKit;

impl LanguageKit for RKit {
    fn language(&self) -> Language {
        Language::R
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec![
            "R".into(),
            "-q".into(),
            "--no-save".into(),
            "--interactive".into(),
        ])
    }

    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        for (i, line) in code.lines().enumerate() {
            out.push_str(&format!(
                "cat(\"{}\\n\")\n",
                active_line_marker(i as u32 + 1)
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("cat(\"{END_OF_EXECUTION_MARKER}\\n\")\n"));
        out
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        // R echoes submitted input behind `> ` / `+ ` prompts.
        let mut text = line.trim_end();
        loop {
            if let Some(rest) = text.strip_prefix("> ") {
                text = rest;
            } else if let Some(rest) = text.strip_prefix("+ ") {
                text = rest;
            } else {
                break;
            }
        }
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == ">" || trimmed == "+" {
            return None;
        }
        // Echoed instrumentation commands are noise; their printed results
        // (the markers themselves) arrive on separate lines.
        if trimmed.starts_with("cat(\"##") {
            return None;
        }
        Some(text.to_string())
    }
}
