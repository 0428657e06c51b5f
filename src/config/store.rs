//! Named session profile store

use super::context::ConfigContext;
use super::session_config::SessionConfig;
use crate::metrics::{counters, labels};
use crate::options::uri::{encode_component, is_uri};
use crate::protocol::SCHEME;
use crate::{ConnectionDescriptor, Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys of the keyed save form that describe the connection itself
const URI_KEY: &str = "uri";
const HOST_KEYS: [&str; 5] = ["host", "user", "password", "port", "schema"];
const APPDATA_KEY: &str = "appdata";

/// Save, update, get, delete and list named session profiles.
///
/// ```
/// use xproto_connect::{ConfigContext, SessionConfigStore};
///
/// # tokio_test::block_on(async {
/// let store = SessionConfigStore::new(ConfigContext::in_memory());
/// store.save_uri("p1", "mysqlx://u@h/s").await?;
/// assert_eq!(store.get("p1").await?.uri, "mysqlx://u@h/s");
/// assert!(store.delete("p1").await);
/// assert!(store.get("p1").await.is_err());
/// # Ok::<(), xproto_connect::Error>(())
/// # })?;
/// # Ok::<(), xproto_connect::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfigStore {
    context: ConfigContext,
}

impl SessionConfigStore {
    /// Store over an explicit context
    pub fn new(context: ConfigContext) -> Self {
        Self { context }
    }

    /// Store over the process-wide context.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if [`ConfigContext::init_global`] was never called.
    pub fn from_global() -> Result<Self> {
        ConfigContext::global()
            .cloned()
            .map(Self::new)
            .ok_or_else(|| Error::Config("no global configuration context installed".to_string()))
    }

    /// Injected capabilities
    pub fn context(&self) -> &ConfigContext {
        &self.context
    }

    /// Save a profile from a URI
    pub async fn save_uri(&self, name: &str, uri: &str) -> Result<SessionConfig> {
        self.save_map(name, [(URI_KEY, uri)]).await
    }

    /// Save a profile from the keyed form.
    ///
    /// Either `uri` or the host fields (`host`, `user`, `password`, `port`,
    /// `schema`) describe the connection; every other key lands in
    /// `app_data`. The host form is stored as
    /// `mysqlx://[user@]host[:port][/schema]`; the password is never written.
    ///
    /// # Errors
    ///
    /// * `Argument` if both forms are given, or `uri`/`host` is empty or missing
    /// * any parse error of the resulting URI
    pub async fn save_map<I, K, V>(&self, name: &str, fields: I) -> Result<SessionConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let config = config_from_fields(name, fields, BTreeMap::new());
        match config {
            Ok(config) => {
                self.save(&config).await?;
                Ok(config)
            }
            Err(e) => {
                counters::profile_operation(labels::OP_SAVE, labels::OUTCOME_ERROR);
                Err(e)
            }
        }
    }

    /// Save a profile from a JSON object.
    ///
    /// Scalars are stringified; a nested `appdata` object is merged into
    /// `app_data`. Other nested values are rejected.
    pub async fn save_document(&self, name: &str, document: &Value) -> Result<SessionConfig> {
        let object = document
            .as_object()
            .ok_or_else(|| Error::argument("session configuration must be a JSON object"))?;

        let mut fields = BTreeMap::new();
        let mut app_data = BTreeMap::new();
        for (key, value) in object {
            match value {
                Value::Object(nested) if key == APPDATA_KEY => {
                    for (k, v) in nested {
                        if let Some(v) = scalar_to_string(k, v)? {
                            app_data.insert(k.clone(), v);
                        }
                    }
                }
                _ => {
                    if let Some(v) = scalar_to_string(key, value)? {
                        fields.insert(key.clone(), v);
                    }
                }
            }
        }

        let config = config_from_fields(name, fields, app_data)?;
        self.save(&config).await?;
        Ok(config)
    }

    /// Save an existing profile, overwriting any profile with the same name
    pub async fn save(&self, config: &SessionConfig) -> Result<()> {
        let result = self.save_validated(config).await;
        record(labels::OP_SAVE, &result);
        if result.is_ok() {
            tracing::info!(profile = %config.name, "saved session configuration");
        }
        result
    }

    async fn save_validated(&self, config: &SessionConfig) -> Result<()> {
        validate(config)?;
        self.context
            .backend()
            .save(&config.name, &config.to_document())
            .await
    }

    /// Replace a stored profile.
    ///
    /// Atomic when the backend supports it; otherwise delete then save, and a
    /// failure in between leaves no profile under the name.
    pub async fn update(&self, config: &SessionConfig) -> Result<()> {
        let result = async {
            validate(config)?;
            let backend = self.context.backend();
            if !backend.supports_atomic_replace() {
                tracing::debug!(profile = %config.name, "backend replaces by delete then save");
            }
            backend.replace(&config.name, &config.to_document()).await
        }
        .await;
        record(labels::OP_UPDATE, &result);
        if result.is_ok() {
            tracing::info!(profile = %config.name, "updated session configuration");
        }
        result
    }

    /// Load a profile.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProfileNotFound` if no profile has this name.
    pub async fn get(&self, name: &str) -> Result<SessionConfig> {
        let result = match self.context.backend().load(name).await {
            Ok(Some(document)) => Ok(SessionConfig::from_document(name, document)),
            Ok(None) => Err(Error::ProfileNotFound(name.to_string())),
            Err(e) => Err(e),
        };
        record(labels::OP_GET, &result);
        result
    }

    /// Delete a profile.
    ///
    /// Returns `false` when nothing was deleted, whether the profile did not
    /// exist or the backend failed.
    pub async fn delete(&self, name: &str) -> bool {
        match self.context.backend().delete(name).await {
            Ok(true) => {
                counters::profile_operation(labels::OP_DELETE, labels::OUTCOME_OK);
                tracing::info!(profile = name, "deleted session configuration");
                true
            }
            Ok(false) => {
                counters::profile_operation(labels::OP_DELETE, labels::OUTCOME_NOT_FOUND);
                false
            }
            Err(e) => {
                counters::profile_operation(labels::OP_DELETE, labels::OUTCOME_ERROR);
                tracing::warn!(profile = name, error = %e, "failed to delete session configuration");
                false
            }
        }
    }

    /// Names of all stored profiles, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let result = self.context.backend().list().await.map(|mut names| {
            names.sort();
            names
        });
        record(labels::OP_LIST, &result);
        result
    }

    /// Load a profile and build its descriptor.
    ///
    /// When the stored URI carries no password and a password handler is
    /// installed, the handler supplies it.
    pub async fn load_descriptor(&self, name: &str) -> Result<ConnectionDescriptor> {
        let config = self.get(name).await?;
        let descriptor = config.descriptor()?;
        if !descriptor.password().is_empty() {
            return Ok(descriptor);
        }
        let Some(handler) = self.context.password_handler() else {
            return Ok(descriptor);
        };
        match handler.resolve_password(name).await? {
            Some(password) => {
                tracing::debug!(profile = name, "password supplied by password handler");
                Ok(descriptor.with_password(password))
            }
            None => Ok(descriptor),
        }
    }
}

fn record<T>(op: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => labels::OUTCOME_OK,
        Err(Error::ProfileNotFound(_)) => labels::OUTCOME_NOT_FOUND,
        Err(_) => labels::OUTCOME_ERROR,
    };
    counters::profile_operation(op, outcome);
}

fn validate(config: &SessionConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(Error::argument("session configuration name must not be empty"));
    }
    validate_uri(&config.uri)
}

/// Stored URIs must use URI syntax and build a valid descriptor
fn validate_uri(uri: &str) -> Result<()> {
    if uri.trim().is_empty() {
        return Err(Error::argument("uri must not be empty"));
    }
    if !is_uri(uri) {
        return Err(Error::argument(format!(
            "uri must use the {}:// syntax",
            SCHEME
        )));
    }
    ConnectionDescriptor::parse(uri).map(|_| ())
}

fn config_from_fields(
    name: &str,
    mut fields: BTreeMap<String, String>,
    mut app_data: BTreeMap<String, String>,
) -> Result<SessionConfig> {
    let has_host_fields = HOST_KEYS.iter().any(|k| fields.contains_key(*k));

    let uri = match fields.remove(URI_KEY) {
        Some(_) if has_host_fields => {
            return Err(Error::argument(
                "specify either uri or host fields (host, user, password, port, schema), not both",
            ));
        }
        Some(uri) if uri.trim().is_empty() => {
            return Err(Error::argument("uri must not be empty"));
        }
        Some(uri) => uri,
        None => {
            let host = fields
                .remove("host")
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| Error::argument("host must not be empty"))?;
            let user = fields.remove("user");
            let port = fields.remove("port");
            let schema = fields.remove("schema");
            if fields.remove("password").is_some() {
                tracing::debug!(profile = name, "password is not stored with the profile");
            }
            host_form_uri(&host, user.as_deref(), port.as_deref(), schema.as_deref())?
        }
    };

    app_data.extend(fields);
    Ok(SessionConfig {
        name: name.to_string(),
        uri,
        app_data,
    })
}

/// `mysqlx://[user@]host[:port][/schema]`
fn host_form_uri(
    host: &str,
    user: Option<&str>,
    port: Option<&str>,
    schema: Option<&str>,
) -> Result<String> {
    let mut uri = format!("{}://", SCHEME);
    if let Some(user) = user.filter(|u| !u.is_empty()) {
        uri.push_str(&encode_component(user));
        uri.push('@');
    }

    let host = host.trim();
    if host.contains(':') && !host.starts_with('[') {
        uri.push_str(&format!("[{}]", host));
    } else {
        uri.push_str(host);
    }

    if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
        let port: u16 = port
            .parse()
            .map_err(|_| Error::argument(format!("invalid port '{}'", port)))?;
        uri.push_str(&format!(":{}", port));
    }
    if let Some(schema) = schema.filter(|s| !s.is_empty()) {
        uri.push('/');
        uri.push_str(&encode_component(schema));
    }
    Ok(uri)
}

fn scalar_to_string(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(Error::argument(format!(
            "value of '{}' must be a string, number or boolean",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_form_uri() {
        assert_eq!(
            host_form_uri("localhost", Some("root"), Some("33060"), Some("test")).unwrap(),
            "mysqlx://root@localhost:33060/test"
        );
        assert_eq!(host_form_uri("db", None, None, None).unwrap(), "mysqlx://db");
        assert_eq!(
            host_form_uri("::1", Some("my user"), None, Some("a b")).unwrap(),
            "mysqlx://my%20user@[::1]/a%20b"
        );
        assert!(matches!(
            host_form_uri("db", None, Some("http"), None),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_fields_uri_and_host_conflict() {
        let fields = BTreeMap::from([
            ("uri".to_string(), "mysqlx://u@h".to_string()),
            ("host".to_string(), "h".to_string()),
        ]);
        assert!(matches!(
            config_from_fields("p", fields, BTreeMap::new()),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_fields_password_dropped_and_extras_to_app_data() {
        let fields = BTreeMap::from([
            ("host".to_string(), "h".to_string()),
            ("user".to_string(), "u".to_string()),
            ("password".to_string(), "secret".to_string()),
            ("color".to_string(), "blue".to_string()),
        ]);
        let config = config_from_fields("p", fields, BTreeMap::new()).unwrap();
        assert_eq!(config.uri, "mysqlx://u@h");
        assert!(!config.uri.contains("secret"));
        assert_eq!(config.app_data.get("color").map(String::as_str), Some("blue"));
        assert!(!config.app_data.contains_key("password"));
    }

    #[test]
    fn test_fields_missing_host() {
        let fields = BTreeMap::from([("user".to_string(), "u".to_string())]);
        assert!(matches!(
            config_from_fields("p", fields, BTreeMap::new()),
            Err(Error::Argument(_))
        ));
        let fields = BTreeMap::from([("host".to_string(), " ".to_string())]);
        assert!(matches!(
            config_from_fields("p", fields, BTreeMap::new()),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_validate_uri() {
        assert!(validate_uri("mysqlx://u@h?ssl-mode=None").is_ok());
        assert!(matches!(validate_uri(""), Err(Error::Argument(_))));
        assert!(matches!(validate_uri("server=h"), Err(Error::Argument(_))));
        assert!(matches!(
            validate_uri("mysqlx://u@h?pooling=false"),
            Err(Error::OptionNotSupported(_))
        ));
    }

    #[test]
    fn test_validate_uri_builds_descriptor() {
        assert!(matches!(
            validate_uri("mysqlx://u@h?auth=EXTERNAL"),
            Err(Error::UnsupportedFeature(_))
        ));
        assert!(matches!(
            validate_uri("mysqlx://u@h?ssl-crl=crl.pem"),
            Err(Error::UnsupportedFeature(_))
        ));
        assert!(matches!(
            validate_uri("mysqlx://u@h?ssl-mode=None&ssl-ca=ca.pem"),
            Err(Error::IncompatibleSettings(_))
        ));
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string("k", &Value::Null).unwrap(), None);
        assert_eq!(
            scalar_to_string("k", &serde_json::json!(3306)).unwrap().as_deref(),
            Some("3306")
        );
        assert!(scalar_to_string("k", &serde_json::json!([1])).is_err());
    }
}
