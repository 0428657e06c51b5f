//! Authentication mechanism resolution
//!
//! Picks the concrete mechanism a session will negotiate from the requested
//! one and the TLS posture:
//!
//! | requested     | TLS active | resolved                                 |
//! |---------------|------------|------------------------------------------|
//! | Auto          | yes        | Plain                                    |
//! | Auto          | no         | Mysql41 (Sha256Memory if server requires)|
//! | Plain         | yes        | Plain                                    |
//! | Plain         | no         | error                                    |
//! | Mysql41       | either     | Mysql41                                  |
//! | Sha256Memory  | either     | Sha256Memory                             |
//! | External      | either     | error                                    |

use crate::connection::TlsMode;
use crate::protocol::constants::mechanisms;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Authentication mechanism
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// Let the client choose based on TLS state
    #[default]
    Auto,
    /// Challenge/response with a SHA1 scramble
    Mysql41,
    /// Clear-text password, only over an encrypted channel
    Plain,
    /// Challenge/response against the server's SHA256 cache
    Sha256Memory,
    /// Externally authenticated (recognized, never accepted)
    External,
}

impl AuthMode {
    /// Mechanism name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Mysql41 => mechanisms::MYSQL41,
            Self::Plain => mechanisms::PLAIN,
            Self::Sha256Memory => mechanisms::SHA256_MEMORY,
            Self::External => mechanisms::EXTERNAL,
        }
    }

    /// Whether this is a concrete mechanism (not `Auto`)
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Auto)
    }

    /// Mechanism to retry with after the server rejected this one
    ///
    /// Only `Mysql41` has a fallback: accounts using `caching_sha2_password`
    /// reject it until the server cache is warm, and `Sha256Memory` succeeds.
    pub fn fallback(&self) -> Option<AuthMode> {
        match self {
            Self::Mysql41 => Some(Self::Sha256Memory),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "auto" | "default" => Ok(Self::Auto),
            "mysql41" => Ok(Self::Mysql41),
            "plain" => Ok(Self::Plain),
            "sha256memory" => Ok(Self::Sha256Memory),
            "external" => Ok(Self::External),
            _ => Err(Error::argument(format!(
                "invalid authentication mode '{}': expected AUTO, MYSQL41, PLAIN or SHA256_MEMORY",
                s.trim()
            ))),
        }
    }
}

/// What is known about the server before authenticating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerAuthHint {
    /// Nothing known
    #[default]
    Unknown,
    /// The server or account only accepts `SHA256_MEMORY` on an unencrypted channel
    RequiresSha256,
}

/// Resolve the mechanism to negotiate
///
/// `tls_negotiated` reports whether an encrypted channel is (or will be)
/// active; it can be false even with a non-`None` mode when a caller
/// resolves against an already established plaintext transport.
///
/// # Errors
///
/// * `IncompatibleSettings` for `Plain` without TLS
/// * `UnsupportedFeature` for `External`
pub fn resolve(
    tls_mode: TlsMode,
    requested: AuthMode,
    tls_negotiated: bool,
    hint: ServerAuthHint,
) -> Result<AuthMode> {
    let tls_active = tls_mode.is_enabled() && tls_negotiated;

    let resolved = match requested {
        AuthMode::Auto if tls_active => AuthMode::Plain,
        AuthMode::Auto => match hint {
            ServerAuthHint::RequiresSha256 => AuthMode::Sha256Memory,
            ServerAuthHint::Unknown => AuthMode::Mysql41,
        },
        AuthMode::Plain if !tls_active => {
            return Err(Error::incompatible(format!(
                "authentication mode PLAIN requires an encrypted channel (ssl-mode={})",
                tls_mode
            )));
        }
        AuthMode::External => {
            return Err(Error::UnsupportedFeature(
                "Invalid authentication method EXTERNAL".to_string(),
            ));
        }
        concrete => concrete,
    };

    tracing::debug!(
        requested = %requested,
        resolved = %resolved,
        tls_mode = %tls_mode,
        tls_active,
        "resolved authentication mode"
    );
    Ok(resolved)
}
