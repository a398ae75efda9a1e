pub mod cleanup;
pub mod concurrency;
pub mod error;
pub mod event_loop;
pub mod flush;
mod macros;
pub mod metrics;
pub mod notify;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod unit;
