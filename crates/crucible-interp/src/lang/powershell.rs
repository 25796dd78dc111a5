use crucible_core::types::Language;

use crate::kit::{active_line_marker, LanguageKit, END_OF_EXECUTION_MARKER};

/// PowerShell driven through `pwsh -NoLogo -NoProfile` (falls back to
/// `powershell` on Windows installs without pwsh).
///
/// A `trap` block prepended to the body prints the failure and continues, so
/// the end marker is still reached.
pub struct PowerShellKit;

fn binary() -> String {
    if cfg!(windows) {
        "powershell".to_string()
    } else {
        "pwsh".to_string()
    }
}

impl LanguageKit for PowerShellKit {
    fn language(&self) -> Language {
        Language::PowerShell
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        Some(vec![binary(), "-NoLogo".into(), "-NoProfile".into()])
    }

    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        out.push_str("trap { Write-Output $_; continue }\n");
        for (i, line) in code.lines().enumerate() {
            out.push_str(&format!(
                "Write-Output \"{}\"\n",
                active_line_marker(i as u32 + 1)
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("Write-Output \"{END_OF_EXECUTION_MARKER}\"\n"));
        out
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        let text = line.trim_end();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        // Interactive prompt echoes look like `PS /some/path>`.
        if trimmed.starts_with("PS ") && trimmed.ends_with('>') {
            return None;
        }
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_prepended_and_end_marker_last() {
        let kit = PowerShellKit;
        let instrumented = kit.preprocess("Get-Date");
        assert!(instrumented.starts_with("trap { Write-Output $_; continue }\n"));
        let last = instrumented.lines().last().expect("empty output");
        assert!(kit.detect_end_of_execution(last));
    }

    #[test]
    fn prompt_lines_are_dropped() {
        let kit = PowerShellKit;
        assert_eq!(kit.postprocess_line("PS /home/user>"), None);
        assert_eq!(kit.postprocess_line("actual output"), Some("actual output".into()));
    }
}
