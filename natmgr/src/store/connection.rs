use std::time::Duration;

use fred::clients::SubscriberClient;
use fred::prelude::{
    ClientLike, EventInterface, HashesInterface, KeysInterface, Pool, PubsubInterface,
    ReconnectPolicy, Server, ServerConfig, TcpConfig,
};
use fred::types::config::UnresponsiveConfig;
use fred::types::{Builder, Key};
use futures::future::join_all;
use natmgr_config::shared::StoreConnectionConfig;
use secrecy::ExposeSecret;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::error::NatResult;
use crate::store::StoreDb;
use crate::store::watch::{TableChangeHandler, TableWatchSource, keyspace_prefix};

/// Number of pooled connections opened per logical database.
const STORE_POOL_SIZE: usize = 5;

/// Page size used when scanning for keys to delete.
const SCAN_PAGE_SIZE: u32 = 100;

/// Builds the client builder shared by connections and subscribers.
///
/// Regular connections select a logical database; subscribers do not,
/// because keyspace events are published outside database scoping and carry
/// the database index in the channel name instead.
fn store_builder(config: &StoreConnectionConfig, database: Option<u8>) -> Builder {
    let mut builder = Builder::default_centralized();

    builder
        .with_config(|store_config| {
            store_config.username = config.username.clone();
            store_config.password = config
                .password
                .as_ref()
                .map(|password| password.expose_secret().to_owned());
            store_config.database = database;
            store_config.server = ServerConfig::Centralized {
                server: Server::new(config.host.clone(), config.port),
            };
        })
        .with_connection_config(|config| {
            config.internal_command_timeout = Duration::from_secs(5);
            config.reconnect_on_auth_error = true;
            config.tcp = TcpConfig {
                #[cfg(target_os = "linux")]
                user_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            };
            config.unresponsive = UnresponsiveConfig {
                max_timeout: Some(Duration::from_secs(10)),
                interval: Duration::from_secs(3),
            };
        })
        .with_performance_config(|config| {
            config.default_command_timeout = Duration::from_secs(5);
        })
        .set_policy(ReconnectPolicy::new_exponential(0, 1, 2000, 5));

    builder
}

/// Spawns tasks that surface connection events for one client.
fn spawn_event_listeners<C: EventInterface>(client: &C) {
    let mut error_rx = client.error_rx();
    let mut reconnect_rx = client.reconnect_rx();
    let mut unresponsive_rx = client.unresponsive_rx();

    tokio::spawn(async move {
        loop {
            match error_rx.recv().await {
                Ok((error, Some(server))) => {
                    error!("state store client ({server:?}) error: {error:?}");
                }
                Ok((error, None)) => {
                    error!("state store client error: {error:?}");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match unresponsive_rx.recv().await {
                Ok(server) => {
                    error!("state store client ({server:?}) unresponsive");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match reconnect_rx.recv().await {
                Ok(server) => {
                    debug!("state store client connected to {server:?}");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Pooled command connection to one logical database of the state store.
#[derive(Clone)]
pub struct StoreConnection {
    client: Pool,
    db: StoreDb,
}

impl StoreConnection {
    /// Connects to the given logical database.
    pub async fn connect(config: &StoreConnectionConfig, db: StoreDb) -> NatResult<Self> {
        let pooled_client = store_builder(config, Some(db.index())).build_pool(STORE_POOL_SIZE)?;

        for client in pooled_client.clients() {
            spawn_event_listeners(client);
        }

        let client_handles = pooled_client.connect_pool();

        debug!(db = %db, "waiting for state store connection");
        pooled_client.wait_for_connect().await?;
        info!(db = %db, "connected to state store");

        tokio::spawn(async move {
            let _results = join_all(client_handles).await;
        });

        Ok(Self {
            client: pooled_client,
            db,
        })
    }

    /// Returns the logical database this connection is bound to.
    pub fn db(&self) -> StoreDb {
        self.db
    }

    /// Reads one field of a hash entry.
    pub async fn hash_field(&self, key: &str, field: &str) -> NatResult<Option<String>> {
        let value: Option<String> = self.client.hget(key, field).await?;
        Ok(value)
    }

    /// Deletes one key and returns whether it existed.
    pub async fn delete(&self, key: &str) -> NatResult<bool> {
        let deleted: i64 = self.client.unlink(key).await?;
        Ok(deleted > 0)
    }

    /// Deletes every key matching the given prefix and returns the count.
    ///
    /// Scans in pages so that large tables never block the store, unlinking
    /// each page as it arrives.
    pub async fn delete_by_prefix(&self, prefix: &str) -> NatResult<u64> {
        let pattern = format!("{prefix}*");
        let mut cursor = "0".to_string();
        let mut total_deleted = 0u64;

        loop {
            let (next_cursor, keys): (String, Vec<Key>) = self
                .client
                .scan_page(cursor, pattern.clone(), Some(SCAN_PAGE_SIZE), None)
                .await?;

            if !keys.is_empty() {
                let deleted: i64 = self.client.unlink(keys).await?;
                total_deleted += deleted as u64;
            }

            cursor = next_cursor;
            if cursor == "0" {
                break;
            }
        }

        Ok(total_deleted)
    }

    /// Publishes a message on a channel and returns the number of receivers.
    pub async fn publish(&self, channel: &str, message: String) -> NatResult<i64> {
        let receivers: i64 = self.client.next().publish(channel, message).await?;
        Ok(receivers)
    }
}

/// Subscriber connection that watches tables of one logical database.
///
/// Wraps a dedicated pub/sub client that re-establishes its pattern
/// subscriptions whenever the connection is rebuilt.
pub struct StoreSubscriber {
    client: SubscriberClient,
    db: StoreDb,
}

impl StoreSubscriber {
    /// Connects the subscriber for the given logical database.
    pub async fn connect(config: &StoreConnectionConfig, db: StoreDb) -> NatResult<Self> {
        let client = store_builder(config, None).build_subscriber_client()?;

        spawn_event_listeners(&client);

        // Re-subscribes all tracked patterns after every reconnect.
        client.manage_subscriptions();

        let connect_handle = client.connect();

        debug!(db = %db, "waiting for state store subscriber connection");
        client.wait_for_connect().await?;
        info!(db = %db, "state store subscriber connected");

        tokio::spawn(async move {
            let _result = connect_handle.await;
        });

        Ok(Self { client, db })
    }

    /// Starts watching one table and returns the event source for it.
    ///
    /// Subscribes to the keyspace events of every entry under the table
    /// prefix. Changes are handed to the given handler when the event loop
    /// dispatches the returned source.
    pub async fn watch_table<H>(&self, table: &str, handler: H) -> NatResult<TableWatchSource<H>>
    where
        H: TableChangeHandler,
    {
        let pattern = format!("{}*", keyspace_prefix(self.db, table));

        self.client.psubscribe(pattern.as_str()).await?;
        debug!(db = %self.db, table = %table, "watching table");

        Ok(TableWatchSource::new(
            self.db,
            table,
            self.client.message_rx(),
            handler,
        ))
    }
}
