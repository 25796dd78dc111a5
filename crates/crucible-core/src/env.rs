//! Environment-variable overrides consumed by the execution engine.

use tracing::warn;

/// Container idle timeout override, `CRUCIBLE_CONTAINER_TIMEOUT` (integer
/// seconds). A value that does not parse is ignored with a warning rather
/// than failing session creation.
pub fn container_idle_timeout() -> Option<u64> {
    let raw = std::env::var("CRUCIBLE_CONTAINER_TIMEOUT").ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!(value = %raw, "ignoring unparsable CRUCIBLE_CONTAINER_TIMEOUT");
            None
        }
    }
}

/// The shell binary to drive: `CRUCIBLE_SHELL`, then the login `SHELL`,
/// then a platform default (`cmd.exe` on Windows).
pub fn default_shell() -> String {
    if let Ok(shell) = std::env::var("CRUCIBLE_SHELL") {
        if !shell.trim().is_empty() {
            return shell;
        }
    }
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.trim().is_empty() {
            return shell;
        }
    }
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        "/bin/bash".to_string()
    }
}

/// The X display number, when one is exported. GUI-adjacent bindings (the
/// HTML interpreter opening a browser) check this before attempting to
/// launch anything graphical.
pub fn display_number() -> Option<String> {
    std::env::var("DISPLAY").ok().filter(|d| !d.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shell_is_never_empty() {
        assert!(!default_shell().is_empty());
    }
}
