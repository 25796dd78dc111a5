use std::io::Write;

use crucible_core::types::{ExecutionEvent, Language};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::kit::LanguageKit;

/// HTML: the degenerate non-REPL binding. The markup is written to a temp
/// file and opened in the default browser; the caller gets a single `Output`
/// event describing what happened, then `EndOfExecution`. No markers, no
/// streaming.
pub struct HtmlKit;

impl LanguageKit for HtmlKit {
    fn language(&self) -> Language {
        Language::Html
    }

    fn repl_command(&self) -> Option<Vec<String>> {
        None
    }

    fn preprocess(&self, code: &str) -> String {
        code.to_string()
    }

    fn one_shot(&self, code: &str) -> Option<Vec<ExecutionEvent>> {
        let path = std::env::temp_dir().join(format!("crucible-{}.html", Uuid::new_v4()));
        let text = match write_page(&path, code) {
            Ok(()) => match open_in_browser(&path) {
                Ok(()) => format!(
                    "Saved to {} and opened with the user's default browser.",
                    path.display()
                ),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not open browser");
                    format!("Saved to {} (could not open a browser: {e}).", path.display())
                }
            },
            Err(e) => format!("Failed to write HTML file: {e}"),
        };
        Some(vec![
            ExecutionEvent::Output(text),
            ExecutionEvent::EndOfExecution,
        ])
    }
}

fn write_page(path: &std::path::Path, code: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(code.as_bytes())?;
    debug!(path = %path.display(), bytes = code.len(), "wrote html page");
    Ok(())
}

fn open_in_browser(path: &std::path::Path) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut cmd = {
        let mut c = std::process::Command::new("open");
        c.arg(path);
        c
    };
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut cmd = {
        // Without an X display there is nothing to open into.
        if crucible_core::env::display_number().is_none() {
            return Err(std::io::Error::other("no DISPLAY available"));
        }
        let mut c = std::process::Command::new("xdg-open");
        c.arg(path);
        c
    };

    cmd.stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_is_identity() {
        let kit = HtmlKit;
        let code = "<html><body>hi</body></html>";
        assert_eq!(kit.preprocess(code), code);
    }

    #[test]
    fn one_shot_ends_with_terminal_event() {
        let kit = HtmlKit;
        let events = kit
            .one_shot("<p>hello</p>")
            .expect("html kit should run one-shot");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ExecutionEvent::Output(_)));
        assert!(events[1].is_terminal());
    }
}
