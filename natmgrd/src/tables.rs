//! The NAT tables unit hosted by the event loop.
//!
//! Watches the NAT-related configuration tables and tracks the state the
//! daemon needs for its own lifecycle: the NAT admin mode, the changes
//! parked while NAT is administratively disabled, and the set of pools whose
//! operational state must be removed on shutdown. Programming the observed
//! rows into the dataplane is the concern of the orchestration peer, not of
//! this unit.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use metrics::gauge;
use natmgr::error::{NatError, NatResult};
use natmgr::metrics::NATMGR_PENDING_CHANGES;
use natmgr::source::EventSource;
use natmgr::store::watch::{TableChange, TableChangeHandler, TableChangeOp};
use natmgr::store::{StoreConnection, StoreSubscriber, TABLE_KEY_SEPARATOR};
use natmgr::unit::TaskUnit;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration tables whose changes drive the NAT manager.
const NAT_TABLES: [&str; 11] = [
    "STATIC_NAT",
    "STATIC_NAPT",
    "NAT_POOL",
    "NAT_BINDINGS",
    "NAT_GLOBAL",
    "INTERFACE",
    "PORTCHANNEL_INTERFACE",
    "VLAN_INTERFACE",
    "LOOPBACK_INTERFACE",
    "ACL_TABLE",
    "ACL_RULE",
];

/// Table carrying the global NAT switches, including the admin mode.
const NAT_GLOBAL_TABLE: &str = "NAT_GLOBAL";

/// Table tracking the configured NAT pools.
const NAT_POOL_TABLE: &str = "NAT_POOL";

/// Field of the global table that enables or disables NAT.
const ADMIN_MODE_FIELD: &str = "admin_mode";

/// Admin mode value that enables NAT.
const ADMIN_MODE_ENABLED: &str = "enabled";

/// State store table holding per-pool operational state.
const STATE_POOL_TABLE: &str = "NAT_POOL_TABLE";

/// Upper bound on changes parked while NAT is disabled.
///
/// The queue holds configuration rows, which arrive at management-plane
/// rates; overflowing it means the configuration churned for a long time
/// with NAT disabled, and the oldest parked change is dropped with a
/// warning.
const MAX_PENDING_CHANGES: usize = 4096;

/// Upper bound on parked changes drained per periodic pass.
///
/// Keeps `run_periodic` bounded so one pass never monopolizes the loop.
const PERIODIC_BATCH: usize = 64;

/// One configuration change parked while NAT was disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingChange {
    table: String,
    change: TableChange,
}

/// Shared state mutated by the table handlers and the periodic pass.
///
/// Guarded by a mutex because the handlers live inside the event sources
/// while the unit itself runs periodic passes and the final pool flush.
#[derive(Default)]
struct UnitState {
    admin_enabled: bool,
    pending: VecDeque<PendingChange>,
    pools: HashSet<String>,
}

impl UnitState {
    /// Applies a new admin mode, returning whether it changed.
    fn set_admin_mode(&mut self, enabled: bool) -> bool {
        let changed = self.admin_enabled != enabled;
        self.admin_enabled = enabled;
        changed
    }

    /// Records a pool change in the set of known pools.
    fn observe_pool(&mut self, change: &TableChange) {
        match change.op {
            TableChangeOp::Set => {
                self.pools.insert(change.key.clone());
            }
            TableChangeOp::Del => {
                self.pools.remove(&change.key);
            }
        }
    }

    /// Parks one change, dropping the oldest when the queue is full.
    ///
    /// Returns the dropped change, if any.
    fn park(&mut self, pending: PendingChange) -> Option<PendingChange> {
        let dropped = if self.pending.len() == MAX_PENDING_CHANGES {
            self.pending.pop_front()
        } else {
            None
        };

        self.pending.push_back(pending);
        dropped
    }

    /// Drains up to one batch of parked changes, in arrival order.
    fn drain_batch(&mut self) -> Vec<PendingChange> {
        let batch = self.pending.len().min(PERIODIC_BATCH);
        self.pending.drain(..batch).collect()
    }
}

/// Returns whether an admin mode field value enables NAT.
///
/// A missing field or an unrecognized value reads as disabled, matching the
/// default of a freshly provisioned device.
fn admin_mode_enabled(value: Option<&str>) -> bool {
    value == Some(ADMIN_MODE_ENABLED)
}

/// Store operations the pool state flush needs.
#[async_trait::async_trait]
trait PoolStateStore: Send + Sync {
    /// Deletes one pool state entry and returns whether it existed.
    async fn delete_pool_entry(&self, key: &str) -> NatResult<bool>;
}

#[async_trait::async_trait]
impl PoolStateStore for StoreConnection {
    async fn delete_pool_entry(&self, key: &str) -> NatResult<bool> {
        self.delete(key).await
    }
}

/// Deletes the state store entry of every known pool.
///
/// Pools are removed from the known set as their entries are deleted, so a
/// repeated flush touches only the pools whose deletion failed before.
/// Failures are collected so one broken entry never shields the rest.
async fn flush_pools<S: PoolStateStore>(store: &S, state: &Mutex<UnitState>) -> NatResult<()> {
    let pools: Vec<String> = {
        let state = state.lock().await;
        state.pools.iter().cloned().collect()
    };

    if pools.is_empty() {
        debug!("no pool state to flush");
        return Ok(());
    }

    let mut errors = Vec::new();
    for pool in pools {
        let key = format!("{STATE_POOL_TABLE}{TABLE_KEY_SEPARATOR}{pool}");

        match store.delete_pool_entry(&key).await {
            Ok(existed) => {
                debug!(pool = %pool, existed, "flushed pool state");
                state.lock().await.pools.remove(&pool);
            }
            Err(error) => errors.push(error),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(NatError::from(errors))
    }
}

/// Handler routing the changes of one watched table into the unit state.
#[derive(Clone)]
struct NatTableHandler {
    state: Arc<Mutex<UnitState>>,
    config_store: StoreConnection,
}

impl NatTableHandler {
    /// Re-reads the admin mode after a global table change.
    ///
    /// Keyspace events carry only the touched key, so the current field
    /// value comes from the configuration store.
    async fn refresh_admin_mode(&self, change: &TableChange) -> NatResult<()> {
        let enabled = match change.op {
            TableChangeOp::Del => false,
            TableChangeOp::Set => {
                let entry = format!(
                    "{NAT_GLOBAL_TABLE}{TABLE_KEY_SEPARATOR}{}",
                    change.key
                );
                let value = self
                    .config_store
                    .hash_field(&entry, ADMIN_MODE_FIELD)
                    .await?;

                admin_mode_enabled(value.as_deref())
            }
        };

        let changed = self.state.lock().await.set_admin_mode(enabled);
        if changed {
            info!(enabled, "NAT admin mode changed");
        }

        Ok(())
    }

    /// Applies one change now, or parks it while NAT is disabled.
    async fn apply_or_park(&self, table: &str, change: TableChange) {
        let mut state = self.state.lock().await;

        if state.admin_enabled {
            debug!(table, key = %change.key, op = %change.op, "applying configuration change");
            return;
        }

        let dropped = state.park(PendingChange {
            table: table.to_owned(),
            change,
        });
        gauge!(NATMGR_PENDING_CHANGES).set(state.pending.len() as f64);

        if let Some(dropped) = dropped {
            warn!(
                table = %dropped.table,
                key = %dropped.change.key,
                "pending change queue full, dropping oldest parked change"
            );
        }
    }
}

#[async_trait::async_trait]
impl TableChangeHandler for NatTableHandler {
    async fn on_changes(&mut self, table: &str, changes: Vec<TableChange>) -> NatResult<()> {
        for change in changes {
            debug!(table, key = %change.key, op = %change.op, "observed table change");

            if table == NAT_GLOBAL_TABLE {
                self.refresh_admin_mode(&change).await?;
                continue;
            }

            if table == NAT_POOL_TABLE {
                self.state.lock().await.observe_pool(&change);
            }

            self.apply_or_park(table, change).await;
        }

        Ok(())
    }
}

/// Task unit owning the NAT configuration tables.
pub struct NatTablesUnit {
    subscriber: StoreSubscriber,
    config_store: StoreConnection,
    state_store: StoreConnection,
    state: Arc<Mutex<UnitState>>,
}

impl NatTablesUnit {
    pub fn new(
        subscriber: StoreSubscriber,
        config_store: StoreConnection,
        state_store: StoreConnection,
    ) -> Self {
        Self {
            subscriber,
            config_store,
            state_store,
            state: Arc::new(Mutex::new(UnitState::default())),
        }
    }
}

#[async_trait::async_trait]
impl TaskUnit for NatTablesUnit {
    fn name(&self) -> &'static str {
        "nat_tables"
    }

    async fn selectables(&mut self) -> NatResult<Vec<Box<dyn EventSource>>> {
        let mut sources: Vec<Box<dyn EventSource>> = Vec::with_capacity(NAT_TABLES.len());

        for table in NAT_TABLES {
            let handler = NatTableHandler {
                state: self.state.clone(),
                config_store: self.config_store.clone(),
            };

            let source = self.subscriber.watch_table(table, handler).await?;
            sources.push(Box::new(source));
        }

        Ok(sources)
    }

    async fn run_periodic(&mut self) -> NatResult<()> {
        let batch = {
            let mut state = self.state.lock().await;
            if !state.admin_enabled || state.pending.is_empty() {
                return Ok(());
            }

            let batch = state.drain_batch();
            gauge!(NATMGR_PENDING_CHANGES).set(state.pending.len() as f64);
            batch
        };

        debug!(changes = batch.len(), "applying parked configuration changes");
        for pending in batch {
            debug!(
                table = %pending.table,
                key = %pending.change.key,
                op = %pending.change.op,
                "applying configuration change"
            );
        }

        Ok(())
    }

    async fn flush_pool_state(&self) -> NatResult<()> {
        flush_pools(&self.state_store, &self.state).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use natmgr::error::ErrorKind;
    use natmgr::nat_error;

    use super::*;

    fn change(key: &str, op: TableChangeOp) -> TableChange {
        TableChange {
            key: key.to_owned(),
            op,
        }
    }

    /// Pool state store recording every deletion attempt.
    #[derive(Default)]
    struct RecordingPoolStore {
        deleted: StdMutex<Vec<String>>,
        failing: StdMutex<HashSet<String>>,
    }

    impl RecordingPoolStore {
        fn fail_key(&self, key: &str) {
            self.failing.lock().unwrap().insert(key.to_owned());
        }

        fn recover_key(&self, key: &str) {
            self.failing.lock().unwrap().remove(key);
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PoolStateStore for RecordingPoolStore {
        async fn delete_pool_entry(&self, key: &str) -> NatResult<bool> {
            self.deleted.lock().unwrap().push(key.to_owned());

            if self.failing.lock().unwrap().contains(key) {
                return Err(nat_error!(
                    ErrorKind::StoreError,
                    "State store operation failed",
                    key.to_owned()
                ));
            }

            Ok(true)
        }
    }

    fn seeded_state(pools: &[&str]) -> Mutex<UnitState> {
        let mut state = UnitState::default();
        for pool in pools {
            state.observe_pool(&change(pool, TableChangeOp::Set));
        }

        Mutex::new(state)
    }

    #[test]
    fn test_admin_mode_parses_only_enabled() {
        assert!(admin_mode_enabled(Some("enabled")));
        assert!(!admin_mode_enabled(Some("disabled")));
        assert!(!admin_mode_enabled(Some("on")));
        assert!(!admin_mode_enabled(None));
    }

    #[test]
    fn test_pool_set_tracks_pool_changes() {
        let mut state = UnitState::default();

        state.observe_pool(&change("pool1", TableChangeOp::Set));
        state.observe_pool(&change("pool2", TableChangeOp::Set));
        state.observe_pool(&change("pool1", TableChangeOp::Del));

        assert_eq!(state.pools, HashSet::from(["pool2".to_owned()]));
    }

    #[test]
    fn test_admin_mode_transition_is_reported_once() {
        let mut state = UnitState::default();

        assert!(state.set_admin_mode(true));
        assert!(!state.set_admin_mode(true));
        assert!(state.set_admin_mode(false));
    }

    #[test]
    fn test_parked_changes_drain_in_arrival_order() {
        let mut state = UnitState::default();

        for index in 0..3 {
            state.park(PendingChange {
                table: "STATIC_NAT".to_owned(),
                change: change(&format!("key{index}"), TableChangeOp::Set),
            });
        }

        let batch = state.drain_batch();
        let keys: Vec<&str> = batch
            .iter()
            .map(|pending| pending.change.key.as_str())
            .collect();

        assert_eq!(keys, vec!["key0", "key1", "key2"]);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_full_queue_drops_the_oldest_parked_change() {
        let mut state = UnitState::default();

        for index in 0..MAX_PENDING_CHANGES {
            let dropped = state.park(PendingChange {
                table: "STATIC_NAT".to_owned(),
                change: change(&format!("key{index}"), TableChangeOp::Set),
            });
            assert!(dropped.is_none());
        }

        let dropped = state
            .park(PendingChange {
                table: "STATIC_NAT".to_owned(),
                change: change("overflow", TableChangeOp::Set),
            })
            .expect("the oldest change should have been dropped");

        assert_eq!(dropped.change.key, "key0");
        assert_eq!(state.pending.len(), MAX_PENDING_CHANGES);
    }

    #[tokio::test]
    async fn test_repeated_pool_flush_deletes_each_entry_once() {
        let store = RecordingPoolStore::default();
        let state = seeded_state(&["pool1", "pool2"]);

        flush_pools(&store, &state).await.unwrap();
        flush_pools(&store, &state).await.unwrap();

        let mut deleted = store.deleted();
        deleted.sort();
        assert_eq!(
            deleted,
            vec![
                "NAT_POOL_TABLE|pool1".to_owned(),
                "NAT_POOL_TABLE|pool2".to_owned(),
            ]
        );
        assert!(state.lock().await.pools.is_empty());
    }

    #[tokio::test]
    async fn test_failed_pool_deletion_is_retried_on_the_next_flush() {
        let store = RecordingPoolStore::default();
        let state = seeded_state(&["pool1", "pool2"]);
        store.fail_key("NAT_POOL_TABLE|pool2");

        let error = flush_pools(&store, &state).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::StoreError);
        assert_eq!(
            state.lock().await.pools,
            HashSet::from(["pool2".to_owned()])
        );

        store.recover_key("NAT_POOL_TABLE|pool2");
        flush_pools(&store, &state).await.unwrap();

        assert!(state.lock().await.pools.is_empty());
        let pool1_attempts = store
            .deleted()
            .iter()
            .filter(|key| key.as_str() == "NAT_POOL_TABLE|pool1")
            .count();
        assert_eq!(pool1_attempts, 1);
    }

    #[tokio::test]
    async fn test_flush_without_known_pools_is_a_noop() {
        let store = RecordingPoolStore::default();
        let state = seeded_state(&[]);

        flush_pools(&store, &state).await.unwrap();

        assert!(store.deleted().is_empty());
    }

    #[test]
    fn test_drain_batch_is_bounded() {
        let mut state = UnitState::default();

        for index in 0..(PERIODIC_BATCH + 10) {
            state.park(PendingChange {
                table: "STATIC_NAT".to_owned(),
                change: change(&format!("key{index}"), TableChangeOp::Set),
            });
        }

        assert_eq!(state.drain_batch().len(), PERIODIC_BATCH);
        assert_eq!(state.pending.len(), 10);
    }
}
