//! Registry of recognized connection options
//!
//! Every key in a connection string, URI query or option map is canonicalized
//! here. Keys match case-insensitively and ignore whitespace, `-` and `_`, so
//! `ssl mode`, `sslmode`, `SSL-Mode` and `ssl_mode` all name [`ConnectOption::SslMode`].
//!
//! Keys belonging to the classic protocol (pooling, command timeouts, named
//! pipes, ...) are kept in an explicit reject list. They are reported exactly
//! like unknown keys: `Option not supported.`

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A recognized connection option, after alias resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectOption {
    /// Host or host list
    Server,
    /// TCP port
    Port,
    /// User name
    User,
    /// Password
    Password,
    /// Default schema requested at connect time
    Database,
    /// TLS posture
    SslMode,
    /// Certificate authority file
    SslCa,
    /// Certificate file (mirrors `ssl-ca` when absent)
    CertificateFile,
    /// Password protecting the certificate file
    CertificatePassword,
    /// PEM client certificate
    SslCert,
    /// PEM client private key
    SslKey,
    /// Certificate revocation list (always rejected)
    SslCrl,
    /// Allowed TLS protocol versions
    TlsVersion,
    /// Authentication mechanism
    Auth,
    /// Connect timeout in seconds
    ConnectTimeout,
    /// TCP keepalive in seconds
    Keepalive,
    /// Character set requested for the session
    CharacterSet,
    /// Resolve hosts through DNS SRV records
    DnsSrv,
}

/// Value domain accepted by an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Single host, IPv6 literal or host list
    HostList,
    /// 16-bit port number
    Port,
    /// Free text
    Text,
    /// File-system path; kept byte-for-byte
    Path,
    /// Unsigned 32-bit integer
    UnsignedInt,
    /// Boolean
    Bool,
    /// [`TlsMode`](crate::TlsMode) name
    TlsMode,
    /// [`AuthMode`](crate::AuthMode) name
    AuthMode,
    /// Comma-separated TLS protocol versions
    TlsVersions,
}

/// Options defined by the classic protocol connector that the X Protocol rejects.
///
/// Entries are normalized (see [`normalize_key`]).
const LEGACY_OPTIONS: &[&str] = &[
    "pipe",
    "pipename",
    "compress",
    "usecompression",
    "allowbatch",
    "logging",
    "sharedmemoryname",
    "defaultcommandtimeout",
    "usedefaultcommandtimeoutforef",
    "persistsecurityinfo",
    "encrypt",
    "integratedsecurity",
    "allowpublickeyretrieval",
    "autoenlist",
    "includesecurityasserts",
    "allowzerodatetime",
    "convertzerodatetime",
    "useusageadvisor",
    "procedurecachesize",
    "useperformancemonitor",
    "ignoreprepare",
    "respectbinaryflags",
    "treattinyasboolean",
    "allowuservariables",
    "interactive",
    "functionsreturnstring",
    "useaffectedrows",
    "oldguids",
    "sqlservermode",
    "tablecaching",
    "defaulttablecacheage",
    "checkparameters",
    "replication",
    "exceptioninterceptors",
    "commandinterceptors",
    "connectionlifetime",
    "pooling",
    "minpoolsize",
    "maxpoolsize",
    "connectionreset",
    "cacheserverproperties",
    "treatblobsasutf8",
    "blobasutf8includepattern",
    "blobasutf8excludepattern",
    "sslenable",
];

impl ConnectOption {
    /// All options, in canonical serialization order
    pub const ALL: [ConnectOption; 18] = [
        ConnectOption::Server,
        ConnectOption::Port,
        ConnectOption::User,
        ConnectOption::Password,
        ConnectOption::Database,
        ConnectOption::SslMode,
        ConnectOption::SslCa,
        ConnectOption::CertificateFile,
        ConnectOption::CertificatePassword,
        ConnectOption::SslCert,
        ConnectOption::SslKey,
        ConnectOption::SslCrl,
        ConnectOption::TlsVersion,
        ConnectOption::Auth,
        ConnectOption::ConnectTimeout,
        ConnectOption::Keepalive,
        ConnectOption::CharacterSet,
        ConnectOption::DnsSrv,
    ];

    /// Canonical key, used in error messages and serialized output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Port => "port",
            Self::User => "user",
            Self::Password => "password",
            Self::Database => "database",
            Self::SslMode => "ssl-mode",
            Self::SslCa => "ssl-ca",
            Self::CertificateFile => "certificate-file",
            Self::CertificatePassword => "ssl-ca-pwd",
            Self::SslCert => "ssl-cert",
            Self::SslKey => "ssl-key",
            Self::SslCrl => "ssl-crl",
            Self::TlsVersion => "tls-version",
            Self::Auth => "auth",
            Self::ConnectTimeout => "connect-timeout",
            Self::Keepalive => "keepalive",
            Self::CharacterSet => "character-set",
            Self::DnsSrv => "dns-srv",
        }
    }

    /// Normalized spellings that resolve to this option
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Server => &[
                "server",
                "host",
                "datasource",
                "address",
                "addr",
                "networkaddress",
            ],
            Self::Port => &["port"],
            Self::User => &["user", "userid", "uid", "username"],
            Self::Password => &["password", "pwd"],
            Self::Database => &["database", "initialcatalog"],
            Self::SslMode => &["sslmode"],
            Self::SslCa => &["sslca"],
            Self::CertificateFile => &["certificatefile"],
            Self::CertificatePassword => &["sslcapwd", "certificatepassword"],
            Self::SslCert => &["sslcert"],
            Self::SslKey => &["sslkey"],
            Self::SslCrl => &["sslcrl"],
            Self::TlsVersion => &["tlsversion", "tlsversions"],
            Self::Auth => &["auth", "authentication"],
            Self::ConnectTimeout => &["connecttimeout", "connectiontimeout", "timeout"],
            Self::Keepalive => &["keepalive"],
            Self::CharacterSet => &["characterset", "charset"],
            Self::DnsSrv => &["dnssrv"],
        }
    }

    /// Accepted value domain
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Server => ValueKind::HostList,
            Self::Port => ValueKind::Port,
            Self::User | Self::Password | Self::Database => ValueKind::Text,
            Self::CertificatePassword | Self::CharacterSet => ValueKind::Text,
            Self::SslCa | Self::CertificateFile | Self::SslCert | Self::SslKey | Self::SslCrl => {
                ValueKind::Path
            }
            Self::SslMode => ValueKind::TlsMode,
            Self::TlsVersion => ValueKind::TlsVersions,
            Self::Auth => ValueKind::AuthMode,
            Self::ConnectTimeout | Self::Keepalive => ValueKind::UnsignedInt,
            Self::DnsSrv => ValueKind::Bool,
        }
    }

    /// Whether the option configures TLS material and therefore conflicts with `ssl-mode=None`
    pub fn is_tls_material(&self) -> bool {
        matches!(
            self,
            Self::SslCa
                | Self::CertificateFile
                | Self::CertificatePassword
                | Self::SslCert
                | Self::SslKey
                | Self::TlsVersion
        )
    }

    /// Whether a URI query may carry this key without `=value`
    pub fn allows_bare_key(&self) -> bool {
        self.kind() == ValueKind::Bool
    }

    /// Whether the value is a secret that must not be logged
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Self::Password | Self::CertificatePassword)
    }
}

impl fmt::Display for ConnectOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnectOption {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        canonicalize(s)
    }
}

/// Normalize a raw option key: lowercase, with whitespace, `-` and `_` removed
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether the key names an option of the classic protocol
pub fn is_legacy_option(raw: &str) -> bool {
    LEGACY_OPTIONS.contains(&normalize_key(raw).as_str())
}

/// Resolve a raw key to its canonical option
///
/// # Errors
///
/// Returns `Error::OptionNotSupported` for legacy and unknown keys alike.
pub fn canonicalize(raw: &str) -> Result<ConnectOption> {
    let key = normalize_key(raw);
    if let Some(option) = ConnectOption::ALL
        .iter()
        .find(|option| option.aliases().contains(&key.as_str()))
    {
        return Ok(*option);
    }

    if LEGACY_OPTIONS.contains(&key.as_str()) {
        tracing::debug!(key = raw.trim(), "rejecting classic protocol option");
    } else {
        tracing::debug!(key = raw.trim(), "rejecting unknown option");
    }
    Err(Error::OptionNotSupported(raw.trim().to_string()))
}

/// Parse a boolean option value
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
