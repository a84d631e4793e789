//! Metric name and label definitions.

/// Directive dispatch metrics
pub mod directives {
    /// Directives passed to `submit`
    pub const SUBMITTED_TOTAL: &str = "vesper_directives_submitted_total";
    /// Directives rejected by the router during pre-handling
    pub const REJECTED_TOTAL: &str = "vesper_directives_rejected_total";
    /// Directives handed to the router's `handle` step
    pub const DISPATCHED_TOTAL: &str = "vesper_directives_dispatched_total";
    /// Directives that reached the completed state
    pub const COMPLETED_TOTAL: &str = "vesper_directives_completed_total";
    /// Directives that reached the failed state
    pub const FAILED_TOTAL: &str = "vesper_directives_failed_total";
    /// Directives canceled by a turn scrub
    pub const CANCELED_TOTAL: &str = "vesper_directives_canceled_total";
    /// Directives waiting in the handling queue
    pub const QUEUE_DEPTH: &str = "vesper_directives_queue_depth";
    /// Time spent inside the router's synchronous `handle` step
    pub const HANDLE_DURATION_SECONDS: &str = "vesper_directives_handle_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const NAMESPACE: &str = "namespace";
    pub const NAME: &str = "name";
}
