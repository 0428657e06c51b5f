//! Session profile store against the memory and file backends

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use xproto_connect::{
    ConfigContext, Error, FileBackend, MemoryBackend, PasswordHandler, PersistenceBackend,
    ProfileDocument, SessionConfig, SessionConfigStore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn memory_store() -> SessionConfigStore {
    init_tracing();
    SessionConfigStore::new(ConfigContext::in_memory())
}

#[tokio::test]
async fn test_save_get_delete() {
    let store = memory_store();

    let saved = store.save_uri("p1", "mysqlx://u@h/s").await.unwrap();
    assert_eq!(saved.uri, "mysqlx://u@h/s");

    let loaded = store.get("p1").await.unwrap();
    assert_eq!(loaded.name, "p1");
    assert_eq!(loaded.uri, "mysqlx://u@h/s");

    assert!(store.delete("p1").await);
    assert!(matches!(store.get("p1").await, Err(Error::ProfileNotFound(_))));
    assert!(!store.delete("p1").await);
}

#[tokio::test]
async fn test_uri_and_host_conflict() {
    let store = memory_store();
    let err = store
        .save_map("p", [("uri", "mysqlx://u@h"), ("host", "h")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_uri_and_host_rejected() {
    let store = memory_store();
    assert!(matches!(
        store.save_map("p", [("uri", "")]).await,
        Err(Error::Argument(_))
    ));
    assert!(matches!(
        store.save_map("p", [("host", "")]).await,
        Err(Error::Argument(_))
    ));
    assert!(matches!(
        store.save_map("p", [("color", "blue")]).await,
        Err(Error::Argument(_))
    ));
}

#[tokio::test]
async fn test_host_form() {
    let store = memory_store();
    let config = store
        .save_map(
            "local",
            [
                ("host", "localhost"),
                ("user", "root"),
                ("password", "secret"),
                ("port", "33060"),
                ("schema", "test"),
                ("theme", "dark"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(config.uri, "mysqlx://root@localhost:33060/test");
    assert_eq!(config.app_data.get("theme").map(String::as_str), Some("dark"));
    assert!(!config.app_data.contains_key("password"));

    let descriptor = store.load_descriptor("local").await.unwrap();
    assert_eq!(descriptor.user(), "root");
    assert_eq!(descriptor.password(), "");
    assert_eq!(descriptor.schema(), Some("test"));
}

#[tokio::test]
async fn test_invalid_uri_not_stored() {
    let store = memory_store();
    assert!(matches!(
        store.save_uri("p", "mysqlx://u@h?pooling=true").await,
        Err(Error::OptionNotSupported(_))
    ));
    assert!(matches!(
        store.save_uri("p", "mysqlx://u@fe80::1").await,
        Err(Error::Format(_))
    ));
    assert!(matches!(
        store.save_uri("p", "mysqlx://u@h?auth=EXTERNAL").await,
        Err(Error::UnsupportedFeature(_))
    ));
    assert!(matches!(
        store.save_uri("p", "mysqlx://u@h:1000?port=2000").await,
        Err(Error::DuplicateOption(_))
    ));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_save_document() {
    let store = memory_store();
    let config = store
        .save_document(
            "doc",
            &json!({
                "uri": "mysqlx://u@h",
                "appdata": { "retries": 3, "color": "red", "note": null },
                "owner": "ops"
            }),
        )
        .await
        .unwrap();

    assert_eq!(config.uri, "mysqlx://u@h");
    assert_eq!(config.app_data.len(), 3);
    assert_eq!(config.app_data["retries"], "3");
    assert_eq!(config.app_data["owner"], "ops");

    assert!(matches!(
        store.save_document("bad", &json!(["not", "an", "object"])).await,
        Err(Error::Argument(_))
    ));
}

#[tokio::test]
async fn test_update_replaces() {
    let store = memory_store();
    store.save_uri("p", "mysqlx://u@h").await.unwrap();

    let updated = SessionConfig::new("p", "mysqlx://v@h2").with_app_data("k", "v");
    store.update(&updated).await.unwrap();
    assert_eq!(store.get("p").await.unwrap(), updated);

    let invalid = SessionConfig::new("p", "");
    assert!(matches!(store.update(&invalid).await, Err(Error::Argument(_))));
    assert_eq!(store.get("p").await.unwrap(), updated);
}

#[tokio::test]
async fn test_list_sorted() {
    let store = memory_store();
    for name in ["zeta", "alpha", "mid"] {
        store.save_uri(name, "mysqlx://u@h").await.unwrap();
    }
    assert_eq!(store.list().await.unwrap(), vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn test_file_backend_round_trip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let store = SessionConfigStore::new(ConfigContext::new(Arc::new(FileBackend::new(&path))));
    store
        .save(&SessionConfig::new("p1", "mysqlx://u@h/s").with_app_data("a", "b"))
        .await
        .unwrap();
    store.save_uri("p2", "mysqlx://u@[::1]:33061").await.unwrap();

    let reopened =
        SessionConfigStore::new(ConfigContext::new(Arc::new(FileBackend::new(&path))));
    assert_eq!(reopened.list().await.unwrap(), vec!["p1", "p2"]);
    let p1 = reopened.get("p1").await.unwrap();
    assert_eq!(p1.uri, "mysqlx://u@h/s");
    assert_eq!(p1.app_data["a"], "b");

    reopened
        .update(&SessionConfig::new("p1", "mysqlx://w@h"))
        .await
        .unwrap();
    assert!(store.get("p1").await.unwrap().app_data.is_empty());

    assert!(reopened.delete("p2").await);
    assert_eq!(store.list().await.unwrap(), vec!["p1"]);
}

struct FailingBackend;

#[async_trait]
impl PersistenceBackend for FailingBackend {
    async fn save(&self, _name: &str, _document: &ProfileDocument) -> xproto_connect::Result<()> {
        Err(Error::Persistence("read-only".into()))
    }
    async fn load(&self, _name: &str) -> xproto_connect::Result<Option<ProfileDocument>> {
        Err(Error::Persistence("unavailable".into()))
    }
    async fn delete(&self, _name: &str) -> xproto_connect::Result<bool> {
        Err(Error::Persistence("read-only".into()))
    }
    async fn list(&self) -> xproto_connect::Result<Vec<String>> {
        Err(Error::Persistence("unavailable".into()))
    }
}

#[tokio::test]
async fn test_delete_swallows_backend_errors() {
    init_tracing();
    let store = SessionConfigStore::new(ConfigContext::new(Arc::new(FailingBackend)));
    assert!(!store.delete("p").await);
    assert!(matches!(store.get("p").await, Err(Error::Persistence(_))));
    assert!(matches!(
        store.save_uri("p", "mysqlx://u@h").await,
        Err(Error::Persistence(_))
    ));
}

struct Vault;

#[async_trait]
impl PasswordHandler for Vault {
    async fn resolve_password(&self, profile: &str) -> xproto_connect::Result<Option<String>> {
        Ok((profile == "vaulted").then(|| "from-vault".to_string()))
    }
}

#[test]
fn test_password_handler_supplies_missing_password() {
    init_tracing();
    let context = ConfigContext::new(Arc::new(MemoryBackend::new()))
        .with_password_handler(Arc::new(Vault));
    let store = SessionConfigStore::new(context);

    tokio_test::block_on(async {
        store.save_uri("vaulted", "mysqlx://u@h").await.unwrap();
        store.save_uri("other", "mysqlx://u@h").await.unwrap();
        store.save_uri("inline", "mysqlx://u:inline@h").await.unwrap();

        let d = store.load_descriptor("vaulted").await.unwrap();
        assert_eq!(d.password(), "from-vault");

        let d = store.load_descriptor("other").await.unwrap();
        assert_eq!(d.password(), "");

        let d = store.load_descriptor("inline").await.unwrap();
        assert_eq!(d.password(), "inline");

        assert!(matches!(
            store.load_descriptor("missing").await,
            Err(Error::ProfileNotFound(_))
        ));
    });
}
