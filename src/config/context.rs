//! Store configuration: persistence backend and password handler

use super::backend::{FileBackend, MemoryBackend, PersistenceBackend};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Resolves secrets for a profile at read time instead of storing them.
#[async_trait]
pub trait PasswordHandler: Send + Sync {
    /// Password for `profile`, or `None` if the handler has none
    async fn resolve_password(&self, profile: &str) -> Result<Option<String>>;
}

static GLOBAL: OnceLock<ConfigContext> = OnceLock::new();

/// Capabilities injected into a [`SessionConfigStore`](super::SessionConfigStore).
///
/// Cheap to clone. A process-wide default may be installed once with
/// [`ConfigContext::init_global`]; it is never swapped afterwards.
#[derive(Clone)]
pub struct ConfigContext {
    backend: Arc<dyn PersistenceBackend>,
    password_handler: Option<Arc<dyn PasswordHandler>>,
}

impl ConfigContext {
    /// Context over the given backend, without a password handler
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            backend,
            password_handler: None,
        }
    }

    /// Context over a fresh [`MemoryBackend`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Context over [`FileBackend::from_env`]
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Arc::new(FileBackend::from_env()?)))
    }

    /// Install a password handler
    pub fn with_password_handler(mut self, handler: Arc<dyn PasswordHandler>) -> Self {
        self.password_handler = Some(handler);
        self
    }

    /// Persistence backend
    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.backend
    }

    /// Password handler, if installed
    pub fn password_handler(&self) -> Option<&Arc<dyn PasswordHandler>> {
        self.password_handler.as_ref()
    }

    /// Install the process-wide default context.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` if a global context is already installed.
    pub fn init_global(context: ConfigContext) -> Result<()> {
        GLOBAL
            .set(context)
            .map_err(|_| Error::argument("the global configuration context is already initialized"))
    }

    /// The process-wide default context, if installed
    pub fn global() -> Option<&'static ConfigContext> {
        GLOBAL.get()
    }
}

impl fmt::Debug for ConfigContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigContext")
            .field("backend", &"<PersistenceBackend>")
            .field("atomic_replace", &self.backend.supports_atomic_replace())
            .field("password_handler", &self.password_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl PasswordHandler for Fixed {
        async fn resolve_password(&self, _profile: &str) -> Result<Option<String>> {
            Ok(Some("s3cret".to_string()))
        }
    }

    #[test]
    fn test_builder_methods() {
        let context = ConfigContext::in_memory();
        assert!(context.password_handler().is_none());
        assert!(context.backend().supports_atomic_replace());

        let context = context.with_password_handler(Arc::new(Fixed));
        let handler = context.password_handler().unwrap().clone();
        let password = tokio_test::block_on(handler.resolve_password("p")).unwrap();
        assert_eq!(password.as_deref(), Some("s3cret"));

        let debug = format!("{:?}", context);
        assert!(debug.contains("password_handler: true"));
    }

    #[test]
    fn test_global_is_set_once() {
        let first = ConfigContext::init_global(ConfigContext::in_memory());
        let second = ConfigContext::init_global(ConfigContext::in_memory());
        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::Argument(_))));
        assert!(ConfigContext::global().is_some());
    }
}
