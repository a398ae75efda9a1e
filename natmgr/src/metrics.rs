//! Metrics definitions for NAT manager monitoring.

/// Label for event source name in metrics.
pub const SOURCE_NAME_LABEL: &str = "source";

/// Label for task unit name in metrics.
pub const UNIT_NAME_LABEL: &str = "unit";

/// Label for configuration table name in metrics.
pub const TABLE_NAME_LABEL: &str = "table";

/// Label for cleanup step name in metrics.
pub const CLEANUP_STEP_LABEL: &str = "step";

// Event loop metrics

/// Counter for total event source dispatches.
pub const NATMGR_DISPATCHES_TOTAL: &str = "natmgr_dispatches_total";

/// Counter for total periodic passes over the registered task units.
pub const NATMGR_PERIODIC_PASSES_TOTAL: &str = "natmgr_periodic_passes_total";

/// Counter for total wait errors on the event multiplexer.
pub const NATMGR_WAIT_ERRORS_TOTAL: &str = "natmgr_wait_errors_total";

// Table watch metrics

/// Counter for total table change events observed.
pub const NATMGR_TABLE_CHANGES_TOTAL: &str = "natmgr_table_changes_total";

/// Gauge for table change events buffered but not yet processed.
pub const NATMGR_PENDING_CHANGES: &str = "natmgr_pending_changes";

// Cleanup metrics

/// Counter for total cleanup steps executed.
pub const NATMGR_CLEANUP_STEPS_TOTAL: &str = "natmgr_cleanup_steps_total";

/// Counter for total cleanup step failures.
pub const NATMGR_CLEANUP_STEP_FAILURES_TOTAL: &str = "natmgr_cleanup_step_failures_total";
