use crucible_core::types::Language;

use crate::kit::{active_line_marker, LanguageKit, END_OF_EXECUTION_MARKER};

/// AppleScript driven through `osascript -i`.
///
/// `log` writes to stderr; both streams feed the same event queue, so marker
/// detection works regardless of origin. The interactive interpreter reports
/// script errors and keeps running.
pub struct AppleScriptKit;

impl LanguageKit for AppleScriptKit {
    fn language(&self) -> Language {
        Language::AppleScript
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec!["osascript".into(), "-i".into()])
    }

    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        for (i, line) in code.lines().enumerate() {
            out.push_str(&format!(
                "log \"{}\"\n",
                active_line_marker(i as u32 + 1)
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("log \"{END_OF_EXECUTION_MARKER}\"\n"));
        out
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        let mut text = line.trim_end();
        // The interactive prompt is `>> `.
        while let Some(rest) = text.strip_prefix(">> ") {
            text = rest;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == ">>" {
            return None;
        }
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_use_log_statements() {
        let kit = AppleScriptKit;
        let instrumented = kit.preprocess("display dialog \"hi\"");
        assert!(instrumented.starts_with("log \"## active_line 1 ##\"\n"));
        let last = instrumented.lines().last().expect("empty output");
        assert!(kit.detect_end_of_execution(last));
    }
}
