use crucible_core::types::Language;

use crate::kit::{active_line_marker, LanguageKit, END_OF_EXECUTION_MARKER};

/// Node.js driven through `node -i`.
///
/// The whole body is wrapped in `try { ... } catch (e) { console.log(e) }`
/// so a thrown error surfaces as output and execution still reaches the end
/// marker, which is printed after the catch.
pub struct JavaScriptKit;

impl LanguageKit for JavaScriptKit {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec!["node".into(), "-i".into()])
    }

    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        out.push_str("try {\n");
        for (i, line) in code.lines().enumerate() {
            out.push_str(&format!(
                "console.log(\"{}\")\n",
                active_line_marker(i as u32 + 1)
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("} catch (e) {\n");
        out.push_str("console.log(e)\n");
        out.push_str("}\n");
        out.push_str(&format!("console.log(\"{END_OF_EXECUTION_MARKER}\")\n"));
        out
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        let mut text = line.trim_end();
        let lead = text.trim_start();
        // REPL startup banner.
        if lead.starts_with("Welcome to Node.js") || lead.starts_with("Type \".help\"") {
            return None;
        }
        // Echoed prompts in front of real output.
        loop {
            if let Some(rest) = text.strip_prefix("> ") {
                text = rest;
            } else if let Some(rest) = text.strip_prefix("... ") {
                text = rest;
            } else {
                break;
            }
        }
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == ">" || trimmed == "..." || trimmed == "undefined" {
            return None;
        }
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_wrapped_in_try_catch() {
        let kit = JavaScriptKit;
        let instrumented = kit.preprocess("console.log(1)");
        assert!(instrumented.starts_with("try {\n"));
        assert!(instrumented.contains("} catch (e) {"));
        assert!(instrumented.contains("console.log(e)"));
        // End marker printed outside the try block, as the last statement.
        let last = instrumented.lines().last().expect("empty output");
        assert!(kit.detect_end_of_execution(last));
    }

    #[test]
    fn repl_banner_is_discarded() {
        let kit = JavaScriptKit;
        assert_eq!(
            kit.postprocess_line("Welcome to Node.js v20.0.0."),
            None
        );
        assert_eq!(kit.postprocess_line("Type \".help\" for more information."), None);
        assert_eq!(kit.postprocess_line("> "), None);
        assert_eq!(kit.postprocess_line("undefined"), None);
        assert_eq!(kit.postprocess_line("> 42"), Some("42".into()));
    }

    #[test]
    fn markers_count_original_lines_only() {
        let kit = JavaScriptKit;
        let code = "let a = 1\nlet b = 2";
        let markers: Vec<u32> = kit
            .preprocess(code)
            .lines()
            .filter_map(crate::kit::parse_active_line)
            .collect();
        assert_eq!(markers, vec![1, 2]);
    }
}
