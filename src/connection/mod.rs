//! Connection descriptors
//!
//! This module handles:
//! * Building a validated [`ConnectionDescriptor`] from parsed options
//! * The fluent [`ConnectionDescriptorBuilder`]
//! * Canonical URI and connection-string serialization
//! * TLS posture and rustls configuration

mod descriptor;
mod format;
mod tls;

pub use descriptor::{ConnectionDescriptor, ConnectionDescriptorBuilder};
pub use tls::{server_name, TlsConfig, TlsConfigBuilder, TlsMode, TlsVersion};
