//! Persistence backends for session profiles

use super::session_config::ProfileDocument;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Environment variable overriding the profile file location
pub const SESSIONS_PATH_ENV: &str = "MYSQLX_SESSIONS_PATH";

/// Durable storage for profile documents.
///
/// Implementations must be safe for concurrent use; the store does not
/// serialize access.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Store (or overwrite) a document.
    async fn save(&self, name: &str, document: &ProfileDocument) -> Result<()>;

    /// Load a document.
    async fn load(&self, name: &str) -> Result<Option<ProfileDocument>>;

    /// Delete a document; `Ok(false)` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// List stored names.
    async fn list(&self) -> Result<Vec<String>>;

    /// Whether `replace` is a single atomic operation.
    fn supports_atomic_replace(&self) -> bool {
        false
    }

    /// Replace a document.
    ///
    /// The default is delete followed by save: a failure between the two
    /// steps leaves no document under `name`.
    async fn replace(&self, name: &str, document: &ProfileDocument) -> Result<()> {
        self.delete(name).await?;
        self.save(name, document).await
    }
}

/// In-process backend, mostly for tests and ephemeral tools
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: RwLock<HashMap<String, ProfileDocument>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn save(&self, name: &str, document: &ProfileDocument) -> Result<()> {
        let mut map = self.map.write().await;
        map.insert(name.to_string(), document.clone());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<ProfileDocument>> {
        let map = self.map.read().await;
        Ok(map.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut map = self.map.write().await;
        Ok(map.remove(name).is_some())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.map.read().await.keys().cloned().collect())
    }

    fn supports_atomic_replace(&self) -> bool {
        true
    }

    async fn replace(&self, name: &str, document: &ProfileDocument) -> Result<()> {
        self.save(name, document).await
    }
}

/// JSON file holding every profile: `{ "<name>": { "uri": ..., "appdata": {...} } }`
///
/// Writes go to a temporary sibling and are renamed into place.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileBackend {
    /// Backend over the given file (created on first save)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Backend at `$MYSQLX_SESSIONS_PATH`, or `$HOME/.mysqlx/sessions.json`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if neither variable is set.
    pub fn from_env() -> Result<Self> {
        if let Some(path) = std::env::var_os(SESSIONS_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(Self::new(path));
        }
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "cannot locate the session store: set {} or HOME",
                    SESSIONS_PATH_ENV
                ))
            })?;
        Ok(Self::new(
            PathBuf::from(home).join(".mysqlx").join("sessions.json"),
        ))
    }

    /// Location of the profile file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, ProfileDocument>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Persistence(format!("cannot parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::Persistence(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_all(&self, profiles: &BTreeMap<String, ProfileDocument>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(profiles)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn save(&self, name: &str, document: &ProfileDocument) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut profiles = self.read_all().await?;
        profiles.insert(name.to_string(), document.clone());
        self.write_all(&profiles).await
    }

    async fn load(&self, name: &str) -> Result<Option<ProfileDocument>> {
        let _guard = self.guard.lock().await;
        Ok(self.read_all().await?.remove(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut profiles = self.read_all().await?;
        if profiles.remove(name).is_none() {
            return Ok(false);
        }
        self.write_all(&profiles).await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let _guard = self.guard.lock().await;
        Ok(self.read_all().await?.into_keys().collect())
    }

    fn supports_atomic_replace(&self) -> bool {
        true
    }

    async fn replace(&self, name: &str, document: &ProfileDocument) -> Result<()> {
        self.save(name, document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(uri: &str) -> ProfileDocument {
        ProfileDocument {
            uri: uri.to_string(),
            appdata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();
        backend.save("a", &doc("mysqlx://u@h")).await.unwrap();
        assert_eq!(backend.load("a").await.unwrap(), Some(doc("mysqlx://u@h")));
        assert_eq!(backend.load("b").await.unwrap(), None);

        backend.replace("a", &doc("mysqlx://v@h")).await.unwrap();
        assert_eq!(backend.load("a").await.unwrap().unwrap().uri, "mysqlx://v@h");

        assert!(backend.delete("a").await.unwrap());
        assert!(!backend.delete("a").await.unwrap());
        assert!(backend.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backend_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("sessions.json"));
        assert!(backend.list().await.unwrap().is_empty());
        assert_eq!(backend.load("x").await.unwrap(), None);
        assert!(!backend.delete("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_backend_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");

        let backend = FileBackend::new(&path);
        backend.save("a", &doc("mysqlx://u@h")).await.unwrap();
        backend.save("b", &doc("mysqlx://v@h")).await.unwrap();

        let reopened = FileBackend::new(&path);
        assert_eq!(reopened.list().await.unwrap(), vec!["a", "b"]);
        assert!(!path.with_extension("json.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["a"]["uri"], "mysqlx://u@h");
    }

    #[tokio::test]
    async fn test_file_backend_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, b"not json").unwrap();

        let backend = FileBackend::new(&path);
        assert!(matches!(backend.list().await, Err(Error::Persistence(_))));
    }

    #[test]
    fn test_default_replace_is_delete_then_save() {
        struct Recording(MemoryBackend, std::sync::Mutex<Vec<&'static str>>);

        #[async_trait]
        impl PersistenceBackend for Recording {
            async fn save(&self, name: &str, document: &ProfileDocument) -> Result<()> {
                self.1.lock().unwrap().push("save");
                self.0.save(name, document).await
            }
            async fn load(&self, name: &str) -> Result<Option<ProfileDocument>> {
                self.0.load(name).await
            }
            async fn delete(&self, name: &str) -> Result<bool> {
                self.1.lock().unwrap().push("delete");
                self.0.delete(name).await
            }
            async fn list(&self) -> Result<Vec<String>> {
                self.0.list().await
            }
        }

        let backend = Recording(MemoryBackend::new(), Default::default());
        assert!(!backend.supports_atomic_replace());
        tokio_test::block_on(backend.replace("a", &doc("mysqlx://u@h"))).unwrap();
        assert_eq!(*backend.1.lock().unwrap(), vec!["delete", "save"]);
    }
}
