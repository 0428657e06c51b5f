//! Authentication mechanism selection

pub mod resolver;

pub use resolver::{resolve, AuthMode, ServerAuthHint};
