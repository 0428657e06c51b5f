//! Metrics for descriptor resolution and profile persistence
//!
//! Thin wrappers over the `metrics` facade. Nothing is recorded unless the
//! application installs a recorder (e.g. a Prometheus exporter).

/// Label names and well-known label values
pub mod labels {
    /// TLS mode label
    pub const TLS_MODE: &str = "tls_mode";
    /// Resolved authentication mechanism label
    pub const AUTH: &str = "auth";
    /// Error category label
    pub const CATEGORY: &str = "category";
    /// Profile operation label
    pub const OPERATION: &str = "op";
    /// Operation outcome label
    pub const OUTCOME: &str = "outcome";
    /// Input surface label
    pub const SURFACE: &str = "surface";

    /// `op` values
    pub const OP_SAVE: &str = "save";
    /// `op` values
    pub const OP_UPDATE: &str = "update";
    /// `op` values
    pub const OP_GET: &str = "get";
    /// `op` values
    pub const OP_DELETE: &str = "delete";
    /// `op` values
    pub const OP_LIST: &str = "list";

    /// `outcome` values
    pub const OUTCOME_OK: &str = "ok";
    /// `outcome` values
    pub const OUTCOME_NOT_FOUND: &str = "not_found";
    /// `outcome` values
    pub const OUTCOME_ERROR: &str = "error";

    /// `surface` values
    pub const SURFACE_URI: &str = "uri";
    /// `surface` values
    pub const SURFACE_CONNECTION_STRING: &str = "connection_string";
    /// `surface` values
    pub const SURFACE_OPTIONS: &str = "options";
}

/// Counter helpers
pub mod counters {
    use super::labels;

    /// A descriptor passed validation
    pub fn descriptor_built(tls_mode: &'static str, auth: &'static str) {
        ::metrics::counter!(
            "xproto_descriptor_built_total",
            labels::TLS_MODE => tls_mode,
            labels::AUTH => auth
        )
        .increment(1);
    }

    /// A descriptor was rejected
    pub fn descriptor_rejected(category: &'static str) {
        ::metrics::counter!(
            "xproto_descriptor_rejected_total",
            labels::CATEGORY => category
        )
        .increment(1);
    }

    /// A session profile operation finished
    pub fn profile_operation(op: &'static str, outcome: &'static str) {
        ::metrics::counter!(
            "xproto_profile_operations_total",
            labels::OPERATION => op,
            labels::OUTCOME => outcome
        )
        .increment(1);
    }
}

/// Histogram helpers
pub mod histograms {
    use super::labels;
    use std::time::Duration;

    /// Time spent parsing and validating one descriptor
    pub fn parse_duration(surface: &'static str, elapsed: Duration) {
        ::metrics::histogram!(
            "xproto_descriptor_parse_seconds",
            labels::SURFACE => surface
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Register descriptions for every metric this crate emits
pub fn describe() {
    ::metrics::describe_counter!(
        "xproto_descriptor_built_total",
        "Connection descriptors that passed validation"
    );
    ::metrics::describe_counter!(
        "xproto_descriptor_rejected_total",
        "Connection descriptors rejected, by error category"
    );
    ::metrics::describe_counter!(
        "xproto_profile_operations_total",
        "Session profile store operations, by operation and outcome"
    );
    ::metrics::describe_histogram!(
        "xproto_descriptor_parse_seconds",
        ::metrics::Unit::Seconds,
        "Time spent parsing and validating a connection descriptor"
    );
}
