//! Canonical serialization of a descriptor
//!
//! Both forms parse back to an equal descriptor once `auth` is concrete:
//! default ports are omitted, `ssl-mode` and `auth` are always written, and
//! the remaining options follow registry order.

use super::descriptor::ConnectionDescriptor;
use crate::options::connection_string::quote_value;
use crate::options::uri::encode_component;
use crate::options::{ConnectOption, HostEntry, ValueKind};
use crate::protocol::{DEFAULT_PORT, SCHEME};
use std::fmt;

const REDACTED: &str = "****";

impl ConnectionDescriptor {
    /// Canonical URI, password included.
    ///
    /// ```
    /// use xproto_connect::ConnectionDescriptor;
    ///
    /// let d = ConnectionDescriptor::parse("server=db;uid=my user;pwd=p@ss;ssl-mode=None")?;
    /// assert_eq!(
    ///     d.to_uri(),
    ///     "mysqlx://my%20user:p%40ss@db?ssl-mode=None&auth=MYSQL41"
    /// );
    /// # Ok::<(), xproto_connect::Error>(())
    /// ```
    pub fn to_uri(&self) -> String {
        self.render_uri(false)
    }

    /// Canonical URI with secrets replaced by `****`, safe to log
    pub fn redacted_uri(&self) -> String {
        self.render_uri(true)
    }

    /// Canonical key/value connection string, password included
    pub fn to_connection_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();

        if has_host_address(&self.hosts) {
            let server = if self.hosts.len() == 1 && self.hosts[0].priority.is_none() {
                host_port(&self.hosts[0])
            } else {
                host_list(&self.hosts)
            };
            pairs.push((ConnectOption::Server.name(), server));
        }
        if !self.user.is_empty() {
            pairs.push((ConnectOption::User.name(), self.user.clone()));
        }
        if !self.password.is_empty() {
            pairs.push((ConnectOption::Password.name(), self.password.clone()));
        }
        if let Some(schema) = &self.schema {
            pairs.push((ConnectOption::Database.name(), schema.clone()));
        }
        for (option, value) in self.option_pairs() {
            pairs.push((option.name(), value));
        }

        pairs
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote_value(value)))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn render_uri(&self, redact: bool) -> String {
        let mut uri = format!("{}://", SCHEME);

        if !self.user.is_empty() || !self.password.is_empty() {
            uri.push_str(&encode_component(&self.user));
            if !self.password.is_empty() {
                uri.push(':');
                if redact {
                    uri.push_str(REDACTED);
                } else {
                    uri.push_str(&encode_component(&self.password));
                }
            }
            uri.push('@');
        }

        if has_host_address(&self.hosts) {
            if self.hosts.len() == 1 && self.hosts[0].priority.is_none() {
                uri.push_str(&host_port(&self.hosts[0]));
            } else {
                uri.push('[');
                uri.push_str(&host_list(&self.hosts));
                uri.push(']');
            }
        }

        if let Some(schema) = &self.schema {
            uri.push('/');
            uri.push_str(&encode_component(schema));
        }

        let query = self
            .option_pairs()
            .into_iter()
            .map(|(option, value)| {
                let value = if redact && option.is_sensitive() && !value.is_empty() {
                    REDACTED.to_string()
                } else if option.kind() == ValueKind::Path && value.starts_with('(') {
                    encode_component(&format!("({})", value))
                } else {
                    encode_component(&value)
                };
                format!("{}={}", option.name(), value)
            })
            .collect::<Vec<_>>()
            .join("&");
        uri.push('?');
        uri.push_str(&query);
        uri
    }

    /// Options other than hosts, credentials and schema, in registry order
    fn option_pairs(&self) -> Vec<(ConnectOption, String)> {
        let mut pairs = vec![
            (ConnectOption::SslMode, self.tls_mode.to_string()),
            (ConnectOption::Auth, self.auth_mode.to_string()),
        ];

        let certificate_file = self
            .certificate_file
            .as_ref()
            .filter(|file| Some(*file) != self.ssl_ca.as_ref());
        let tls_material = [
            (ConnectOption::SslCa, self.ssl_ca.as_ref()),
            (ConnectOption::CertificateFile, certificate_file),
            (ConnectOption::CertificatePassword, self.certificate_password.as_ref()),
            (ConnectOption::SslCert, self.ssl_cert.as_ref()),
            (ConnectOption::SslKey, self.ssl_key.as_ref()),
        ];
        for (option, value) in tls_material {
            if let Some(value) = value {
                pairs.push((option, value.clone()));
            }
        }

        if !self.tls_versions.is_empty() {
            let versions = self
                .tls_versions
                .iter()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(",");
            pairs.push((ConnectOption::TlsVersion, versions));
        }

        for (option, value) in &self.extras {
            pairs.push((*option, value.clone()));
        }
        if let Some(port) = port_without_host(&self.hosts) {
            pairs.push((ConnectOption::Port, port.to_string()));
        }

        pairs.sort_by_key(|(option, _)| *option);
        pairs
    }
}

fn has_host_address(hosts: &[HostEntry]) -> bool {
    !matches!(hosts, [only] if only.address.is_empty() && only.priority.is_none())
}

/// A non-default port set without any host is written as the `port` option
fn port_without_host(hosts: &[HostEntry]) -> Option<u16> {
    match hosts {
        [only] if !has_host_address(hosts) && only.port != DEFAULT_PORT => Some(only.port),
        _ => None,
    }
}

fn host_port(host: &HostEntry) -> String {
    if host.port == DEFAULT_PORT {
        host.bracketed_address()
    } else {
        host.to_string()
    }
}

fn host_list(hosts: &[HostEntry]) -> String {
    hosts
        .iter()
        .map(|host| match host.priority {
            Some(priority) => format!("(address={},priority={})", host_port(host), priority),
            None => host_port(host),
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_uri())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &str| if secret.is_empty() { "" } else { REDACTED };
        f.debug_struct("ConnectionDescriptor")
            .field("hosts", &self.hosts)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("schema", &self.schema)
            .field("tls_mode", &self.tls_mode)
            .field("ssl_ca", &self.ssl_ca)
            .field("certificate_file", &self.certificate_file)
            .field(
                "certificate_password",
                &self.certificate_password.as_deref().map(redact),
            )
            .field("ssl_cert", &self.ssl_cert)
            .field("ssl_key", &self.ssl_key)
            .field("tls_versions", &self.tls_versions)
            .field("requested_auth", &self.requested_auth)
            .field("auth_mode", &self.auth_mode)
            .field("extras", &self.extras)
            .finish()
    }
}
