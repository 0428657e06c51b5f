//! TLS posture and rustls configuration for X Protocol sessions.
//!
//! The descriptor only decides *what* TLS configuration to request; the
//! handshake itself belongs to the transport. [`TlsConfig`] compiles that
//! decision into a rustls [`ClientConfig`] the transport can hand to a
//! connector.

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;

/// TLS mode of an X Protocol session (`ssl-mode` option).
///
/// Unlike the classic protocol there is no `Preferred` mode: the session
/// either insists on TLS or never attempts it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TlsMode {
    /// No TLS (plaintext connection)
    None,
    /// TLS required, server certificate is not verified
    #[default]
    Required,
    /// TLS required, server certificate must chain to a trusted CA
    VerifyCa,
    /// TLS required, server certificate must chain to a trusted CA and match the host
    VerifyFull,
}

impl TlsMode {
    /// Whether TLS is requested at all
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether this mode requires certificate verification (CA or full)
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Required => "Required",
            Self::VerifyCa => "VerifyCA",
            Self::VerifyFull => "VerifyFull",
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "none" | "disabled" => Ok(Self::None),
            "required" => Ok(Self::Required),
            "verifyca" => Ok(Self::VerifyCa),
            "verifyfull" => Ok(Self::VerifyFull),
            "preferred" | "prefered" => Err(Error::argument(format!(
                "ssl-mode '{}' is not valid for X Protocol connections",
                s.trim()
            ))),
            _ => Err(Error::argument(format!(
                "invalid ssl-mode '{}': expected None, Required, VerifyCA or VerifyFull",
                s.trim()
            ))),
        }
    }
}

/// TLS protocol version accepted by the `tls-version` option
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tls12 => "TLSv1.2",
            Self::Tls13 => "TLSv1.3",
        }
    }

    /// Parse a comma-separated version list, sorted and deduplicated
    pub fn parse_list(value: &str) -> Result<Vec<TlsVersion>> {
        let mut versions = value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<TlsVersion>>>()?;
        if versions.is_empty() {
            return Err(Error::argument("tls-version must name at least one protocol version"));
        }
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    fn rustls_version(&self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tlsv1.2" | "tls1.2" => Ok(Self::Tls12),
            "tlsv1.3" | "tls1.3" => Ok(Self::Tls13),
            "tlsv1" | "tlsv1.0" | "tlsv1.1" | "tls1.0" | "tls1.1" => Err(Error::argument(
                format!("TLS version '{}' is no longer supported", s.trim()),
            )),
            _ => Err(Error::argument(format!(
                "invalid TLS version '{}': expected TLSv1.2 or TLSv1.3",
                s.trim()
            ))),
        }
    }
}

/// Compiled TLS configuration for one descriptor.
///
/// # Examples
///
/// ```ignore
/// use xproto_connect::connection::{TlsConfig, TlsMode};
///
/// // System roots, full verification
/// let tls = TlsConfig::builder().mode(TlsMode::VerifyFull).build()?;
///
/// // Custom CA, chain verification only
/// let tls = TlsConfig::builder()
///     .mode(TlsMode::VerifyCa)
///     .ca_cert_path("/path/to/ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    mode: TlsMode,
    ca_cert_path: Option<String>,
    client_cert_path: Option<String>,
    versions: Vec<TlsVersion>,
    verify_hostname: bool,
    danger_accept_invalid_certs: bool,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// TLS mode this configuration was compiled for
    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    /// Custom CA file, if any
    pub fn ca_cert_path(&self) -> Option<&str> {
        self.ca_cert_path.as_deref()
    }

    /// Whether a client certificate is presented
    pub fn has_client_auth(&self) -> bool {
        self.client_cert_path.is_some()
    }

    /// Allowed protocol versions (empty means the rustls defaults)
    pub fn versions(&self) -> &[TlsVersion] {
        &self.versions
    }

    /// Check if hostname verification is enabled.
    pub fn verify_hostname(&self) -> bool {
        self.verify_hostname
    }

    /// Check if invalid certificates are accepted (`Required` mode).
    pub fn danger_accept_invalid_certs(&self) -> bool {
        self.danger_accept_invalid_certs
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("mode", &self.mode)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_cert_path", &self.client_cert_path)
            .field("versions", &self.versions)
            .field("verify_hostname", &self.verify_hostname)
            .field(
                "danger_accept_invalid_certs",
                &self.danger_accept_invalid_certs,
            )
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
pub struct TlsConfigBuilder {
    mode: TlsMode,
    ca_cert_path: Option<String>,
    client_cert: Option<(String, String)>,
    versions: Vec<TlsVersion>,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            mode: TlsMode::VerifyFull,
            ca_cert_path: None,
            client_cert: None,
            versions: Vec::new(),
        }
    }
}

impl TlsConfigBuilder {
    /// Set the TLS mode (default: `VerifyFull`).
    ///
    /// `Required` accepts any server certificate, `VerifyCa` checks the
    /// chain only, `VerifyFull` also checks the hostname.
    pub fn mode(mut self, mode: TlsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Present a client certificate (PEM chain and PEM private key).
    pub fn client_cert(mut self, cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.client_cert = Some((cert_path.into(), key_path.into()));
        self
    }

    /// Restrict the negotiated protocol versions.
    pub fn versions(mut self, versions: &[TlsVersion]) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if:
    /// - the mode is `None`
    /// - a certificate or key file cannot be read or holds no usable PEM item
    /// - rustls rejects the client certificate/key pair
    pub fn build(self) -> Result<TlsConfig> {
        if !self.mode.is_enabled() {
            return Err(Error::Config(
                "cannot build a TLS configuration for ssl-mode=None".to_string(),
            ));
        }

        let verify_hostname = self.mode == TlsMode::VerifyFull;
        let danger_accept_invalid_certs = self.mode == TlsMode::Required;

        let versions: Vec<&'static rustls::SupportedProtocolVersion> = if self.versions.is_empty() {
            rustls::DEFAULT_VERSIONS.to_vec()
        } else {
            self.versions.iter().map(TlsVersion::rustls_version).collect()
        };
        let builder = ClientConfig::builder_with_protocol_versions(&versions);
        let provider = builder.crypto_provider().clone();

        let builder = if danger_accept_invalid_certs {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        } else {
            let roots = match &self.ca_cert_path {
                Some(ca_path) => load_custom_ca(ca_path)?,
                None => load_system_roots(),
            };
            if verify_hostname {
                builder.with_root_certificates(roots)
            } else {
                let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                    .build()
                    .map_err(|e| Error::Config(format!("invalid root certificates: {}", e)))?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(ChainOnlyVerifier { inner }))
            }
        };

        let client_config = match &self.client_cert {
            Some((cert_path, key_path)) => {
                let chain = load_cert_chain(cert_path)?;
                let key = load_private_key(key_path)?;
                builder.with_client_auth_cert(chain, key).map_err(|e| {
                    Error::Config(format!(
                        "invalid client certificate '{}' / key '{}': {}",
                        cert_path, key_path, e
                    ))
                })?
            }
            None => builder.with_no_client_auth(),
        };

        tracing::debug!(
            mode = %self.mode,
            custom_ca = self.ca_cert_path.is_some(),
            client_auth = self.client_cert.is_some(),
            "compiled TLS configuration"
        );

        Ok(TlsConfig {
            mode: self.mode,
            ca_cert_path: self.ca_cert_path,
            client_cert_path: self.client_cert.map(|(cert, _)| cert),
            versions: self.versions,
            verify_hostname,
            danger_accept_invalid_certs,
            client_config: Arc::new(client_config),
        })
    }
}

/// Native roots, or the bundled webpki roots when the platform store is empty
fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    let (added, _) = store.add_parsable_certificates(result.certs);

    if added == 0 {
        tracing::debug!(
            errors = result.errors.len(),
            "no usable native root certificates, using bundled webpki roots"
        );
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    store
}

/// Load a custom CA certificate from a PEM file.
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Config(format!(
            "Failed to read CA certificate file '{}': {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "Failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(root_store)
}

fn load_cert_chain(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path).map_err(|e| {
        Error::Config(format!("Failed to read client certificate '{}': {}", path, e))
    })?;
    let chain = rustls_pemfile::certs(&mut data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::Config(format!("Failed to parse client certificate '{}'", path)))?;
    if chain.is_empty() {
        return Err(Error::Config(format!("No certificates found in '{}'", path)));
    }
    Ok(chain)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path)
        .map_err(|e| Error::Config(format!("Failed to read client key '{}': {}", path, e)))?;
    rustls_pemfile::private_key(&mut data.as_slice())
        .map_err(|_| Error::Config(format!("Failed to parse client key '{}'", path)))?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path)))
}

/// Server name for SNI and certificate verification.
///
/// Accepts DNS names and IPv4/IPv6 literals (no brackets, no zone).
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    let host = host.trim_end_matches('.');
    if host.is_empty() || host.len() > 253 {
        return Err(Error::Config(format!("Invalid hostname for TLS: '{}'", host)));
    }
    ServerName::try_from(host.to_string())
        .map_err(|_| Error::Config(format!("Invalid hostname for TLS: '{}'", host)))
}

/// `Required`: encrypt, but trust whatever certificate the server presents
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// `VerifyCA`: full chain validation, hostname mismatch tolerated
#[derive(Debug)]
struct ChainOnlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_mode_from_str() {
        assert_eq!("None".parse::<TlsMode>().unwrap(), TlsMode::None);
        assert_eq!("disabled".parse::<TlsMode>().unwrap(), TlsMode::None);
        assert_eq!("REQUIRED".parse::<TlsMode>().unwrap(), TlsMode::Required);
        assert_eq!("VerifyCA".parse::<TlsMode>().unwrap(), TlsMode::VerifyCa);
        assert_eq!("verify_ca".parse::<TlsMode>().unwrap(), TlsMode::VerifyCa);
        assert_eq!("verify-full".parse::<TlsMode>().unwrap(), TlsMode::VerifyFull);
    }

    #[test]
    fn test_preferred_rejected() {
        for s in ["Preferred", "prefered", "PREFERRED"] {
            let err = s.parse::<TlsMode>().unwrap_err();
            assert!(matches!(err, Error::Argument(_)), "{s}");
        }
        assert!(matches!("bogus".parse::<TlsMode>(), Err(Error::Argument(_))));
    }

    #[test]
    fn test_tls_mode_display_round_trip() {
        for mode in [TlsMode::None, TlsMode::Required, TlsMode::VerifyCa, TlsMode::VerifyFull] {
            assert_eq!(mode.to_string().parse::<TlsMode>().unwrap(), mode);
        }
        assert_eq!(TlsMode::default(), TlsMode::Required);
    }

    #[test]
    fn test_tls_mode_verification() {
        assert!(!TlsMode::None.is_enabled());
        assert!(!TlsMode::Required.requires_verification());
        assert!(TlsMode::VerifyCa.requires_verification());
        assert!(TlsMode::VerifyFull.requires_verification());
    }

    #[test]
    fn test_tls_version_list() {
        let versions = TlsVersion::parse_list("TLSv1.3, tlsv1.2,TLSv1.3").unwrap();
        assert_eq!(versions, vec![TlsVersion::Tls12, TlsVersion::Tls13]);

        assert!(matches!(TlsVersion::parse_list("TLSv1.1"), Err(Error::Argument(_))));
        assert!(matches!(TlsVersion::parse_list(" , "), Err(Error::Argument(_))));
        assert!(matches!(TlsVersion::parse_list("SSLv3"), Err(Error::Argument(_))));
    }

    #[test]
    fn test_build_rejects_none() {
        let err = TlsConfig::builder().mode(TlsMode::None).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_required_accepts_any_cert() {
        let tls = TlsConfig::builder().mode(TlsMode::Required).build().unwrap();
        assert!(tls.danger_accept_invalid_certs());
        assert!(!tls.verify_hostname());
    }

    #[test]
    fn test_missing_ca_file() {
        let err = TlsConfig::builder()
            .mode(TlsMode::VerifyCa)
            .ca_cert_path("/nonexistent/ca.pem")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read CA certificate file"));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("db.example.com").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("::1").is_ok());
        assert!(server_name("").is_err());
        assert!(server_name("bad host").is_err());
    }
}
