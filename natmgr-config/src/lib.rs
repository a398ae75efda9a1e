//! Configuration loading for the NAT manager daemon.
//!
//! Configuration is layered: a base file, an environment-specific file, and
//! `APP_`-prefixed environment variable overrides, merged in that order.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
