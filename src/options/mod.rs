//! Connection option parsing
//!
//! This module handles:
//! * Option registry (canonical names, aliases, classic-protocol reject list)
//! * Key/value connection strings
//! * Connection URIs
//! * Host specifications and failover lists
//!
//! Both parsers produce the same [`ParsedOptions`], which
//! [`ConnectionDescriptor::build`](crate::ConnectionDescriptor::build) validates.

pub mod connection_string;
pub mod hosts;
pub mod registry;
pub mod uri;

pub use hosts::{HostEntry, HostSpec};
pub use registry::{canonicalize, normalize_key, ConnectOption, ValueKind};

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Canonical option name → raw value, with duplicate detection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: BTreeMap<ConnectOption, String>,
}

impl OptionMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value for a canonical option
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateOption` if the option already has a value,
    /// whichever alias supplied it.
    pub fn insert(&mut self, option: ConnectOption, value: impl Into<String>) -> Result<()> {
        if self.entries.contains_key(&option) {
            return Err(Error::DuplicateOption(option.name().to_string()));
        }
        self.entries.insert(option, value.into());
        Ok(())
    }

    /// Canonicalize a raw key and insert its value
    pub fn insert_raw(&mut self, key: &str, value: impl Into<String>) -> Result<ConnectOption> {
        let option = canonicalize(key)?;
        self.insert(option, value)?;
        Ok(option)
    }

    /// Value of an option
    pub fn get(&self, option: ConnectOption) -> Option<&str> {
        self.entries.get(&option).map(String::as_str)
    }

    /// Whether an option is present (possibly with an empty value)
    pub fn contains(&self, option: ConnectOption) -> bool {
        self.entries.contains_key(&option)
    }

    /// Remove an option, returning its value
    pub fn remove(&mut self, option: ConnectOption) -> Option<String> {
        self.entries.remove(&option)
    }

    /// Iterate in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (ConnectOption, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Number of options
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of either parser: canonical options plus structurally parsed hosts
///
/// `hosts` is only filled by the URI parser; the key/value syntax carries its
/// host list in the `server` option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    /// Canonical options
    pub options: OptionMap,
    /// Hosts taken from the URI authority
    pub hosts: Vec<HostSpec>,
}

impl ParsedOptions {
    /// Parse any textual surface: empty input, URI or key/value connection string
    ///
    /// A scheme-less `user@host` is treated like a URI of a foreign scheme and
    /// yields the defaults.
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        if !input.contains('=') && input.contains('@') && !input.contains("://") {
            tracing::debug!("ignoring URI without scheme");
            return Ok(Self::default());
        }
        if uri::is_uri(input) {
            uri::parse(input)
        } else {
            connection_string::parse(input)
        }
    }

    /// Build from a structured option map
    ///
    /// Equivalent to a key/value connection string without quoting concerns.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut options = OptionMap::new();
        for (key, value) in pairs {
            options.insert_raw(key.as_ref(), value)?;
        }
        Ok(Self {
            options,
            hosts: Vec::new(),
        })
    }
}
