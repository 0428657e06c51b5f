//! Validated connection descriptor

use super::tls::{TlsConfig, TlsMode, TlsVersion};
use crate::auth::{self, AuthMode, ServerAuthHint};
use crate::metrics::{counters, histograms, labels};
use crate::options::hosts::{check_priorities, parse_host_list};
use crate::options::registry::parse_bool;
use crate::options::{uri, ConnectOption, HostEntry, HostSpec, ParsedOptions, ValueKind};
use crate::protocol::constants::priority;
use crate::protocol::DEFAULT_PORT;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Fully validated connection configuration.
///
/// Every constructor runs the same validation; there is no way to obtain a
/// descriptor that failed any check. `auth_mode` is always concrete.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub(super) hosts: Vec<HostEntry>,
    pub(super) user: String,
    pub(super) password: String,
    pub(super) schema: Option<String>,
    pub(super) tls_mode: TlsMode,
    pub(super) ssl_ca: Option<String>,
    pub(super) certificate_file: Option<String>,
    pub(super) certificate_password: Option<String>,
    pub(super) ssl_cert: Option<String>,
    pub(super) ssl_key: Option<String>,
    pub(super) tls_versions: Vec<TlsVersion>,
    pub(super) requested_auth: AuthMode,
    pub(super) auth_mode: AuthMode,
    pub(super) extras: BTreeMap<ConnectOption, String>,
}

impl ConnectionDescriptor {
    /// Parse a URI or key/value connection string and validate it.
    ///
    /// Blank input yields the default descriptor (empty host, default port,
    /// `Required` TLS).
    ///
    /// # Examples
    ///
    /// ```
    /// use xproto_connect::ConnectionDescriptor;
    ///
    /// let d = ConnectionDescriptor::parse("server=[::1];user=root;ssl-mode=None")?;
    /// assert_eq!(d.hosts()[0].address, "::1");
    /// assert_eq!(d.hosts()[0].port, 33060);
    /// # Ok::<(), xproto_connect::Error>(())
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let surface = if uri::is_uri(input) {
            labels::SURFACE_URI
        } else {
            labels::SURFACE_CONNECTION_STRING
        };
        let start = Instant::now();
        let result = ParsedOptions::parse(input).and_then(Self::build);
        histograms::parse_duration(surface, start.elapsed());
        if let Err(e) = &result {
            tracing::debug!(surface, error = %e, "rejected connection input");
        }
        result
    }

    /// Validate a structured option map.
    ///
    /// Keys go through the same alias table as the textual forms.
    pub fn from_options<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let start = Instant::now();
        let result = ParsedOptions::from_pairs(pairs).and_then(Self::build);
        histograms::parse_duration(labels::SURFACE_OPTIONS, start.elapsed());
        result
    }

    /// Create a builder with typed setters
    pub fn builder() -> ConnectionDescriptorBuilder {
        ConnectionDescriptorBuilder::default()
    }

    /// Validate parser output and resolve the authentication mode.
    ///
    /// # Errors
    ///
    /// * `UnsupportedFeature` if `ssl-crl` is present or auth is `EXTERNAL`
    /// * `DuplicateOption` if the URI authority and a `server` option both name hosts,
    ///   or `port` is given while every host carries its own port
    /// * `Argument` for unparseable values (ssl-mode, auth, port, timeouts, ...)
    /// * `IncompatibleSettings` for TLS material with `ssl-mode=None`, or
    ///   `PLAIN` without TLS
    pub fn build(parsed: ParsedOptions) -> Result<Self> {
        let result = Self::validate(parsed);
        match &result {
            Ok(d) => counters::descriptor_built(d.tls_mode.as_str(), d.auth_mode.as_str()),
            Err(e) => counters::descriptor_rejected(e.category()),
        }
        result
    }

    fn validate(parsed: ParsedOptions) -> Result<Self> {
        let ParsedOptions { mut options, hosts } = parsed;

        if options.contains(ConnectOption::SslCrl) {
            return Err(Error::UnsupportedFeature(
                "ssl-crl: certificate revocation lists are not supported".to_string(),
            ));
        }
        if !hosts.is_empty() && options.contains(ConnectOption::Server) {
            return Err(Error::DuplicateOption(ConnectOption::Server.name().to_string()));
        }

        let tls_mode = options
            .remove(ConnectOption::SslMode)
            .map(|v| v.parse::<TlsMode>())
            .transpose()?
            .unwrap_or_default();
        let requested_auth = options
            .remove(ConnectOption::Auth)
            .map(|v| v.parse::<AuthMode>())
            .transpose()?
            .unwrap_or_default();

        let port_option = options
            .remove(ConnectOption::Port)
            .map(|v| parse_port(&v))
            .transpose()?;

        let specs: Vec<HostSpec> = if !hosts.is_empty() {
            hosts
        } else if let Some(server) = options.remove(ConnectOption::Server) {
            parse_host_list(&server, true)?
        } else {
            Vec::new()
        };
        check_priorities(&specs)?;
        // `port` only fills in hosts without their own port
        if port_option.is_some() && !specs.is_empty() && specs.iter().all(|h| h.port.is_some()) {
            return Err(Error::DuplicateOption(ConnectOption::Port.name().to_string()));
        }

        let explicit_port = port_option.is_some() || specs.iter().any(|h| h.port.is_some());
        let host_count = specs.len();
        let default_port = port_option.unwrap_or(DEFAULT_PORT);
        let hosts = if specs.is_empty() {
            vec![HostEntry::new("", default_port)]
        } else {
            specs.into_iter().map(|h| h.resolve(default_port)).collect()
        };

        let ssl_ca = options.remove(ConnectOption::SslCa);
        let certificate_file = options
            .remove(ConnectOption::CertificateFile)
            .or_else(|| ssl_ca.clone());
        let certificate_password = options.remove(ConnectOption::CertificatePassword);
        let ssl_cert = options.remove(ConnectOption::SslCert);
        let ssl_key = options.remove(ConnectOption::SslKey);
        let tls_version_raw = options.remove(ConnectOption::TlsVersion);

        if tls_mode == TlsMode::None {
            let conflicting = [
                (ConnectOption::SslCa, &ssl_ca),
                (ConnectOption::CertificateFile, &certificate_file),
                (ConnectOption::CertificatePassword, &certificate_password),
                (ConnectOption::SslCert, &ssl_cert),
                (ConnectOption::SslKey, &ssl_key),
                (ConnectOption::TlsVersion, &tls_version_raw),
            ]
            .into_iter()
            .find(|(_, value)| value.as_deref().is_some_and(|v| !v.trim().is_empty()));
            if let Some((option, _)) = conflicting {
                return Err(Error::incompatible(format!(
                    "ssl-mode=None cannot be combined with {}",
                    option
                )));
            }
        }

        let tls_versions = tls_version_raw
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(TlsVersion::parse_list)
            .transpose()?
            .unwrap_or_default();

        let has_cert = ssl_cert.as_deref().is_some_and(|v| !v.is_empty());
        let has_key = ssl_key.as_deref().is_some_and(|v| !v.is_empty());
        if has_cert != has_key {
            return Err(Error::argument("ssl-cert and ssl-key must be given together"));
        }

        let user = options.remove(ConnectOption::User).unwrap_or_default();
        let password = options.remove(ConnectOption::Password).unwrap_or_default();
        let schema = options
            .remove(ConnectOption::Database)
            .filter(|s| !s.is_empty());

        let mut extras = BTreeMap::new();
        for (option, value) in options.iter() {
            extras.insert(option, normalize_extra(option, value)?);
        }

        if extras.get(&ConnectOption::DnsSrv).map(String::as_str) == Some("true") {
            if host_count > 1 {
                return Err(Error::argument(
                    "specifying multiple hosts is not permitted with dns-srv",
                ));
            }
            if explicit_port {
                return Err(Error::argument(
                    "specifying a port number is not permitted with dns-srv",
                ));
            }
        }

        let auth_mode = auth::resolve(
            tls_mode,
            requested_auth,
            tls_mode.is_enabled(),
            ServerAuthHint::Unknown,
        )?;

        let descriptor = Self {
            hosts,
            user,
            password,
            schema,
            tls_mode,
            ssl_ca,
            certificate_file,
            certificate_password,
            ssl_cert,
            ssl_key,
            tls_versions,
            requested_auth,
            auth_mode,
            extras,
        };
        tracing::debug!(descriptor = %descriptor.redacted_uri(), "built connection descriptor");
        Ok(descriptor)
    }

    /// Hosts in order of appearance
    pub fn hosts(&self) -> &[HostEntry] {
        &self.hosts
    }

    /// Hosts in failover order: highest priority first, ties keep input order
    pub fn hosts_by_priority(&self) -> Vec<&HostEntry> {
        let mut hosts: Vec<&HostEntry> = self.hosts.iter().collect();
        hosts.sort_by(|a, b| b.priority.cmp(&a.priority));
        hosts
    }

    /// User name (empty when not given)
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password (empty when not given)
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Default schema, absent when not given or empty
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// TLS mode
    pub fn tls_mode(&self) -> TlsMode {
        self.tls_mode
    }

    /// Authentication mode as requested (may be `Auto`)
    pub fn requested_auth(&self) -> AuthMode {
        self.requested_auth
    }

    /// Resolved authentication mode (never `Auto`)
    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// CA certificate path; `Some("")` means "connect without a certificate"
    pub fn ssl_ca(&self) -> Option<&str> {
        self.ssl_ca.as_deref()
    }

    /// Certificate file path (mirrors `ssl-ca` when not given)
    pub fn certificate_file(&self) -> Option<&str> {
        self.certificate_file.as_deref()
    }

    /// Certificate file password
    pub fn certificate_password(&self) -> Option<&str> {
        self.certificate_password.as_deref()
    }

    /// Client certificate path
    pub fn ssl_cert(&self) -> Option<&str> {
        self.ssl_cert.as_deref()
    }

    /// Client private key path
    pub fn ssl_key(&self) -> Option<&str> {
        self.ssl_key.as_deref()
    }

    /// Allowed TLS versions (empty means library defaults)
    pub fn tls_versions(&self) -> &[TlsVersion] {
        &self.tls_versions
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.extra_secs(ConnectOption::ConnectTimeout)
    }

    /// TCP keepalive interval
    pub fn keepalive(&self) -> Option<Duration> {
        self.extra_secs(ConnectOption::Keepalive)
    }

    /// Requested character set
    pub fn character_set(&self) -> Option<&str> {
        self.option(ConnectOption::CharacterSet)
    }

    /// Whether hosts are resolved through DNS SRV records
    pub fn dns_srv(&self) -> bool {
        self.option(ConnectOption::DnsSrv) == Some("true")
    }

    /// Normalized value of a remaining scalar option
    pub fn option(&self, option: ConnectOption) -> Option<&str> {
        self.extras.get(&option).map(String::as_str)
    }

    fn extra_secs(&self, option: ConnectOption) -> Option<Duration> {
        self.option(option)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Resolve the mechanism for an actual session.
    ///
    /// Unlike the descriptor's own `auth_mode`, this uses what the transport
    /// negotiated and what is known about the server.
    pub fn negotiate_auth(&self, tls_negotiated: bool, hint: ServerAuthHint) -> Result<AuthMode> {
        auth::resolve(self.tls_mode, self.requested_auth, tls_negotiated, hint)
    }

    /// Same descriptor with a different password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Compile the TLS settings into a rustls configuration.
    ///
    /// Returns `Ok(None)` for `ssl-mode=None`. Empty certificate paths are
    /// treated as absent.
    pub fn to_tls_config(&self) -> Result<Option<TlsConfig>> {
        if !self.tls_mode.is_enabled() {
            return Ok(None);
        }

        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

        let mut builder = TlsConfig::builder()
            .mode(self.tls_mode)
            .versions(&self.tls_versions);
        if let Some(ca) = non_empty(&self.ssl_ca).or_else(|| non_empty(&self.certificate_file)) {
            builder = builder.ca_cert_path(ca);
        }
        if let (Some(cert), Some(key)) = (non_empty(&self.ssl_cert), non_empty(&self.ssl_key)) {
            builder = builder.client_cert(cert, key);
        }
        builder.build().map(Some)
    }
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            hosts: vec![HostEntry::new("", DEFAULT_PORT)],
            user: String::new(),
            password: String::new(),
            schema: None,
            tls_mode: TlsMode::Required,
            ssl_ca: None,
            certificate_file: None,
            certificate_password: None,
            ssl_cert: None,
            ssl_key: None,
            tls_versions: Vec::new(),
            requested_auth: AuthMode::Auto,
            auth_mode: AuthMode::Plain,
            extras: BTreeMap::new(),
        }
    }
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| Error::argument(format!("invalid port '{}'", value.trim())))
}

/// Validate and normalize the remaining scalar options
fn normalize_extra(option: ConnectOption, value: &str) -> Result<String> {
    match option.kind() {
        ValueKind::UnsignedInt => value
            .trim()
            .parse::<u32>()
            .map(|n| n.to_string())
            .map_err(|_| {
                Error::argument(format!(
                    "{} must be a non-negative integer, got '{}'",
                    option,
                    value.trim()
                ))
            }),
        ValueKind::Bool => parse_bool(value)
            .map(|b| b.to_string())
            .ok_or_else(|| {
                Error::argument(format!("{} must be true or false, got '{}'", option, value.trim()))
            }),
        _ => Ok(value.to_string()),
    }
}

/// Fluent construction of a [`ConnectionDescriptor`].
///
/// Typed setters overwrite earlier calls; raw `option` pairs go through the
/// alias table and conflict with typed setters for the same option.
///
/// ```
/// use xproto_connect::{AuthMode, ConnectionDescriptor, TlsMode};
///
/// let d = ConnectionDescriptor::builder()
///     .host("db1:3307")
///     .user("app")
///     .tls_mode(TlsMode::None)
///     .auth(AuthMode::Sha256Memory)
///     .build()?;
/// assert_eq!(d.hosts()[0].port, 3307);
/// # Ok::<(), xproto_connect::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionDescriptorBuilder {
    hosts: Vec<(String, Option<u8>)>,
    typed: BTreeMap<ConnectOption, String>,
    raw: Vec<(String, String)>,
}

impl ConnectionDescriptorBuilder {
    /// Add a host (`host`, `host:port`, `[ipv6]:port` or bare IPv6)
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push((host.into(), None));
        self
    }

    /// Add a host with a failover priority (0..=100)
    pub fn host_with_priority(mut self, host: impl Into<String>, priority: u8) -> Self {
        self.hosts.push((host.into(), Some(priority)));
        self
    }

    /// Default port for hosts without one
    pub fn port(self, port: u16) -> Self {
        self.set(ConnectOption::Port, port.to_string())
    }

    /// User name
    pub fn user(self, user: impl Into<String>) -> Self {
        self.set(ConnectOption::User, user.into())
    }

    /// Password
    pub fn password(self, password: impl Into<String>) -> Self {
        self.set(ConnectOption::Password, password.into())
    }

    /// Default schema
    pub fn schema(self, schema: impl Into<String>) -> Self {
        self.set(ConnectOption::Database, schema.into())
    }

    /// TLS mode
    pub fn tls_mode(self, mode: TlsMode) -> Self {
        self.set(ConnectOption::SslMode, mode.to_string())
    }

    /// Requested authentication mode
    pub fn auth(self, mode: AuthMode) -> Self {
        self.set(ConnectOption::Auth, mode.to_string())
    }

    /// CA certificate path
    pub fn ssl_ca(self, path: impl Into<String>) -> Self {
        self.set(ConnectOption::SslCa, path.into())
    }

    /// Client certificate and key paths
    pub fn client_cert(self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.set(ConnectOption::SslCert, cert.into())
            .set(ConnectOption::SslKey, key.into())
    }

    /// Allowed TLS versions
    pub fn tls_versions(self, versions: &[TlsVersion]) -> Self {
        let list = versions
            .iter()
            .map(TlsVersion::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.set(ConnectOption::TlsVersion, list)
    }

    /// Connect timeout, in whole seconds
    pub fn connect_timeout(self, timeout: Duration) -> Self {
        self.set(ConnectOption::ConnectTimeout, timeout.as_secs().to_string())
    }

    /// Any option by name or alias
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw.push((key.into(), value.into()));
        self
    }

    fn set(mut self, option: ConnectOption, value: String) -> Self {
        self.typed.insert(option, value);
        self
    }

    /// Validate and build the descriptor
    pub fn build(self) -> Result<ConnectionDescriptor> {
        let mut parsed = ParsedOptions::from_pairs(self.raw)?;
        for (option, value) in self.typed {
            parsed.options.insert(option, value)?;
        }
        for (host, priority) in self.hosts {
            let specs = parse_host_list(&host, true)?;
            parsed.hosts.extend(specs.into_iter().map(|mut spec| {
                if priority.is_some() {
                    spec.priority = priority;
                }
                spec
            }));
        }
        if let Some(priority) = parsed
            .hosts
            .iter()
            .filter_map(|h| h.priority)
            .find(|p| *p > priority::MAX)
        {
            return Err(Error::argument(format!(
                "priority must be an integer between {} and {}, got '{}'",
                priority::MIN,
                priority::MAX,
                priority
            )));
        }
        ConnectionDescriptor::build(parsed)
    }
}
