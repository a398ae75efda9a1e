//! Telemetry initialization for NAT manager services.
//!
//! Provides tracing and metrics setup shared by the daemon binary and its
//! tests.

pub mod metrics;
pub mod tracing;
