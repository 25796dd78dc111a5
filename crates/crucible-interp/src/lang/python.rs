use crucible_core::types::Language;

use crate::kit::{active_line_marker, LanguageKit, END_OF_EXECUTION_MARKER};

/// Python driven through `python3 -i -q -u`: unbuffered interactive REPL.
///
/// The interactive interpreter already reports uncaught exceptions and keeps
/// running, so no extra trap is wrapped around the body.
pub struct PythonKit;

impl LanguageKit for PythonKit {
    fn language(&self) -> Language {
        Language::Python
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec![
            "python3".into(),
            "-i".into(),
            "-q".into(),
            "-u".into(),
        ])
    }

    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        for (i, line) in code.lines().enumerate() {
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            out.push_str(&format!(
                "{indent}print(\"{}\")\n",
                active_line_marker(i as u32 + 1)
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("print(\"{END_OF_EXECUTION_MARKER}\")\n"));
        out
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        // The REPL echoes `>>> `/`... ` prompts on stderr; strip any that
        // leak in front of real output.
        let mut text = line.trim_end();
        loop {
            if let Some(rest) = text.strip_prefix(">>> ") {
                text = rest;
            } else if let Some(rest) = text.strip_prefix("... ") {
                text = rest;
            } else {
                break;
            }
        }
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == ">>>" || trimmed == "..." {
            return None;
        }
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::parse_active_line;

    #[test]
    fn markers_track_lines_and_indentation() {
        let kit = PythonKit;
        let code = "x = 1\nif x:\n    print(x)";
        let instrumented = kit.preprocess(code);
        let lines: Vec<&str> = instrumented.lines().collect();

        assert_eq!(parse_active_line(lines[0]), Some(1));
        assert_eq!(lines[1], "x = 1");
        assert_eq!(parse_active_line(lines[2]), Some(2));
        // The marker for an indented line carries the same indentation so it
        // stays inside the enclosing block.
        assert!(lines[4].starts_with("    print("));
        assert_eq!(parse_active_line(lines[4]), Some(3));
        assert!(kit.detect_end_of_execution(lines.last().expect("missing end marker")));
    }

    #[test]
    fn prompt_echoes_are_dropped() {
        let kit = PythonKit;
        assert_eq!(kit.postprocess_line(">>> "), None);
        assert_eq!(kit.postprocess_line(">>> hello"), Some("hello".into()));
        assert_eq!(kit.postprocess_line("... ... done"), Some("done".into()));
    }
}
