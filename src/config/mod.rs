//! Named session profiles
//!
//! This module handles:
//! * Profile types ([`SessionConfig`], [`ProfileDocument`])
//! * Pluggable persistence ([`PersistenceBackend`], memory and JSON file backends)
//! * Password resolution at read time ([`PasswordHandler`])
//! * The explicit [`ConfigContext`] passed to [`SessionConfigStore`]

mod backend;
mod context;
mod session_config;
mod store;

pub use backend::{FileBackend, MemoryBackend, PersistenceBackend, SESSIONS_PATH_ENV};
pub use context::{ConfigContext, PasswordHandler};
pub use session_config::{ProfileDocument, SessionConfig};
pub use store::SessionConfigStore;
