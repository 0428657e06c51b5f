//! Protocol-level constants shared by the parsers and the resolver

pub mod constants;

pub use constants::{DEFAULT_PORT, SCHEME};
