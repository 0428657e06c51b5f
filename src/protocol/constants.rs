//! X Protocol constants

/// URI scheme of the X Protocol
pub const SCHEME: &str = "mysqlx";

/// Default X Protocol port
pub const DEFAULT_PORT: u16 = 33060;

/// Host priority bounds for multi-host lists
pub mod priority {
    /// Lowest accepted priority
    pub const MIN: u8 = 0;

    /// Highest accepted priority
    pub const MAX: u8 = 100;
}

/// Authentication mechanism names as sent in `AuthenticateStart`
pub mod mechanisms {
    /// MySQL 4.1 native password scramble
    pub const MYSQL41: &str = "MYSQL41";

    /// Cleartext password, TLS only
    pub const PLAIN: &str = "PLAIN";

    /// SHA-256 challenge against the server's in-memory cache
    pub const SHA256_MEMORY: &str = "SHA256_MEMORY";

    /// Externally authenticated (not implemented by the X Plugin)
    pub const EXTERNAL: &str = "EXTERNAL";
}
