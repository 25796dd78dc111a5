use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.crucible/config.toml`.
///
/// Every section has sensible defaults, so a missing file (the common case)
/// yields a fully usable config. Secrets never live here; anything
/// credential-shaped is read from the environment at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub container: ContainerConfig,
}

impl Config {
    /// Load config from `~/.crucible/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpreter.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "interpreter.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.shell.command_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "shell.command_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".crucible")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

/// Tuning for the generic interpreter session driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Queue poll interval while draining events, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Automatic process restarts allowed per `run` call.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Extra queue polls performed after the end marker, to catch trailing
    /// lines still in flight.
    #[serde(default = "default_trailing_drain_polls")]
    pub trailing_drain_polls: u32,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_restarts: default_max_restarts(),
            trailing_drain_polls: default_trailing_drain_polls(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    150
}

fn default_max_restarts() -> u32 {
    3
}

fn default_trailing_drain_polls() -> u32 {
    3
}

/// Settings for the persistent shell session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Per-command deadline, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Shell binary override. When unset, `CRUCIBLE_SHELL` then `SHELL`
    /// from the environment decide.
    #[serde(default)]
    pub shell: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            shell: None,
        }
    }
}

fn default_command_timeout_secs() -> u64 {
    120
}

/// Optional container-backend wiring for interpreter sessions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContainerConfig {
    /// When true, the registry generates one session id per agent session
    /// and passes it to every interpreter it creates.
    #[serde(default)]
    pub enabled: bool,
    /// Idle timeout in seconds; `CRUCIBLE_CONTAINER_TIMEOUT` overrides.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
