//! Error types

use std::io;
use thiserror::Error;

/// Main error type
///
/// Every validation failure is raised before a descriptor is returned; no
/// partially validated descriptor ever escapes.
#[derive(Debug, Error)]
pub enum Error {
    /// Input does not match the connection string or URI grammar
    #[error("Invalid connection string format. {0}")]
    Format(String),

    /// Unknown option, or an option that only exists for the classic protocol
    #[error("Option not supported. ({0})")]
    OptionNotSupported(String),

    /// The same canonical option was supplied more than once
    #[error("`{0}` is duplicated.")]
    DuplicateOption(String),

    /// Semantically invalid value for a recognized option
    #[error("Invalid argument. {0}")]
    Argument(String),

    /// Parseable but deliberately unimplemented feature
    #[error("Not supported. {0}")]
    UnsupportedFeature(String),

    /// Mutually exclusive combination of otherwise valid settings
    #[error("Incompatible settings. {0}")]
    IncompatibleSettings(String),

    /// No session configuration is stored under the given name
    #[error("Session configuration not found: {0}")]
    ProfileNotFound(String),

    /// Persistence backend failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// TLS material or configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable category name, used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            Error::Format(_) => "format",
            Error::OptionNotSupported(_) => "option_not_supported",
            Error::DuplicateOption(_) => "duplicate_option",
            Error::Argument(_) => "argument",
            Error::UnsupportedFeature(_) => "unsupported_feature",
            Error::IncompatibleSettings(_) => "incompatible_settings",
            Error::ProfileNotFound(_) => "profile_not_found",
            Error::Persistence(_) => "persistence",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }

    /// Helper for format errors
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Helper for argument errors
    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Error::Argument(msg.into())
    }

    /// Helper for incompatible settings
    pub(crate) fn incompatible(msg: impl Into<String>) -> Self {
        Error::IncompatibleSettings(msg.into())
    }
}
