//! State store access for the NAT manager.
//!
//! The daemon talks to a single store endpoint that multiplexes several
//! logical databases at fixed indices. Regular commands go through
//! [`StoreConnection`]; table watching goes through [`StoreSubscriber`],
//! which turns keyspace events into [`watch::TableChange`] values.

mod connection;
pub mod watch;

pub use connection::{StoreConnection, StoreSubscriber};

use std::fmt;

/// Logical databases multiplexed behind the shared store endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDb {
    /// Application state published for consumption by the dataplane.
    Appl,
    /// Configuration pushed by the management layer.
    Config,
    /// Operational state reported back by the platform.
    State,
}

impl StoreDb {
    /// Returns the database index behind the shared endpoint.
    pub fn index(&self) -> u8 {
        match self {
            StoreDb::Appl => 0,
            StoreDb::Config => 4,
            StoreDb::State => 6,
        }
    }

    /// Returns the conventional name of the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreDb::Appl => "APPL_DB",
            StoreDb::Config => "CONFIG_DB",
            StoreDb::State => "STATE_DB",
        }
    }
}

impl fmt::Display for StoreDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Separator between a table name and an entry key within that table.
pub const TABLE_KEY_SEPARATOR: &str = "|";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_db_indices_are_fixed() {
        assert_eq!(StoreDb::Appl.index(), 0);
        assert_eq!(StoreDb::Config.index(), 4);
        assert_eq!(StoreDb::State.index(), 6);
    }
}
