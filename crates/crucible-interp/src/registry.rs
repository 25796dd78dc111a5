use std::sync::{Arc, OnceLock};

use crucible_core::config::InterpreterConfig;
use crucible_core::types::Language;
use tracing::{debug, info};
use uuid::Uuid;

use crate::kit::kit_for;
use crate::session::{ContainerContext, Session};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Callback the registry hands to container-backed sessions; invoked with
/// the container session id when a session closes.
pub type CloseCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ---------------------------------------------------------------------------
// InterpreterRegistry
// ---------------------------------------------------------------------------

struct ContainerWiring {
    session_id: OnceLock<String>,
    on_close: CloseCallback,
}

impl ContainerWiring {
    /// One identifier per agent session, generated on first use and reused
    /// for every language created afterwards.
    fn session_id(&self) -> &str {
        self.session_id.get_or_init(|| {
            let id = Uuid::new_v4().to_string();
            info!(session_id = %id, "generated container session id");
            id
        })
    }
}

/// Maps a language name to a [`Session`]. Lookup is case-insensitive and
/// fails with [`RegistryError::UnsupportedLanguage`] before any process is
/// spawned.
pub struct InterpreterRegistry {
    config: InterpreterConfig,
    container: Option<ContainerWiring>,
}

impl InterpreterRegistry {
    /// Plain mode: sessions get no container wiring.
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            container: None,
        }
    }

    /// Container mode: every created session shares one lazily generated
    /// session id and reports back through `on_close` at teardown. The idle
    /// timeout comes from `CRUCIBLE_CONTAINER_TIMEOUT`.
    pub fn with_container(config: InterpreterConfig, on_close: CloseCallback) -> Self {
        Self {
            config,
            container: Some(ContainerWiring {
                session_id: OnceLock::new(),
                on_close,
            }),
        }
    }

    /// Create a session for `language_name`. The process itself is spawned
    /// lazily on the session's first `run`.
    pub fn create(&self, language_name: &str) -> Result<Session, RegistryError> {
        let language = Language::from_name(language_name)
            .ok_or_else(|| RegistryError::UnsupportedLanguage(language_name.to_string()))?;
        debug!(%language, "creating interpreter session");

        let container = self.container.as_ref().map(|wiring| {
            ContainerContext::new(
                wiring.session_id(),
                crucible_core::env::container_idle_timeout(),
                Arc::clone(&wiring.on_close),
            )
        });

        Ok(Session::new(kit_for(language), self.config.clone(), container))
    }

    /// All language bindings this registry can create.
    pub fn supported_languages(&self) -> &'static [Language] {
        Language::all()
    }
}

impl std::fmt::Debug for InterpreterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterRegistry")
            .field("container_mode", &self.container.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_fails_before_spawn() {
        let registry = InterpreterRegistry::new(InterpreterConfig::default());
        let err = registry.create("ruby").expect_err("ruby should be unsupported");
        match err {
            RegistryError::UnsupportedLanguage(name) => assert_eq!(name, "ruby"),
        }
    }

    #[test]
    fn container_session_id_is_generated_once() {
        let registry = InterpreterRegistry::with_container(
            InterpreterConfig::default(),
            Arc::new(|_| {}),
        );
        let a = registry.create("python").expect("create python");
        let b = registry.create("shell").expect("create shell");
        let id_a = a.container().expect("python missing container").session_id.clone();
        let id_b = b.container().expect("shell missing container").session_id.clone();
        assert_eq!(id_a, id_b, "all languages in one agent session share one id");
    }
}
