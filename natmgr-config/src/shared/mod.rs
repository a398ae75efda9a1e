//! Shared configuration types for the NAT manager daemon.

mod base;
mod natmgrd;
mod store;

pub use base::ValidationError;
pub use natmgrd::{DEFAULT_CLEANUP_CHANNEL, NatmgrdConfig, NatmgrdConfigWithoutSecrets};
pub use store::{StoreConnectionConfig, StoreConnectionConfigWithoutSecrets};
