//! Concurrency primitives used to coordinate the daemon's actors.

pub mod shutdown;
