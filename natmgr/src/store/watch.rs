use std::collections::VecDeque;
use std::fmt;

use fred::types::Message;
use metrics::counter;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, NatResult};
use crate::metrics::{NATMGR_TABLE_CHANGES_TOTAL, TABLE_NAME_LABEL};
use crate::source::EventSource;
use crate::store::{StoreDb, TABLE_KEY_SEPARATOR};

/// Builds the keyspace notification channel prefix for a table.
pub(crate) fn keyspace_prefix(db: StoreDb, table: &str) -> String {
    format!(
        "__keyspace@{}__:{}{}",
        db.index(),
        table,
        TABLE_KEY_SEPARATOR
    )
}

/// A single observed change to an entry of a watched table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    /// Entry key within the table, without the table prefix.
    pub key: String,
    /// What happened to the entry.
    pub op: TableChangeOp,
}

/// The kind of change a keyspace event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChangeOp {
    /// The entry was created or one of its fields changed.
    Set,
    /// The entry was removed.
    Del,
}

impl TableChangeOp {
    /// Classifies a keyspace event name.
    ///
    /// A partial `hdel` leaves the entry in place, so it reads as a field
    /// update rather than a removal. Events that cannot touch hash entries
    /// are ignored.
    fn from_event(event: &str) -> Option<Self> {
        match event {
            "hset" | "hsetnx" | "hincrby" | "hincrbyfloat" | "hdel" | "restore" | "rename_to" => {
                Some(Self::Set)
            }
            "del" | "unlink" | "expired" => Some(Self::Del),
            _ => None,
        }
    }
}

impl fmt::Display for TableChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Del => write!(f, "del"),
        }
    }
}

/// Receives batches of changes for one watched table.
#[async_trait::async_trait]
pub trait TableChangeHandler: Send + Sync {
    async fn on_changes(&mut self, table: &str, changes: Vec<TableChange>) -> NatResult<()>;
}

/// Event source that surfaces keyspace events for one table.
///
/// Readiness buffers events internally so that a cancelled wait never loses
/// a change. Dispatch drains everything buffered so far, plus whatever else
/// is already sitting in the subscription stream, into a single handler
/// call.
pub struct TableWatchSource<H> {
    table: String,
    channel_prefix: String,
    rx: broadcast::Receiver<Message>,
    pending: VecDeque<TableChange>,
    handler: H,
}

impl<H: TableChangeHandler> TableWatchSource<H> {
    pub(crate) fn new(
        db: StoreDb,
        table: &str,
        rx: broadcast::Receiver<Message>,
        handler: H,
    ) -> Self {
        Self {
            table: table.to_owned(),
            channel_prefix: keyspace_prefix(db, table),
            rx,
            pending: VecDeque::new(),
            handler,
        }
    }

    /// Buffers one keyspace event if it belongs to this table.
    fn buffer(&mut self, message: Message) {
        let Some(key) = message.channel.strip_prefix(self.channel_prefix.as_str()) else {
            return;
        };
        let key = key.to_owned();

        let event: String = match message.value.convert() {
            Ok(event) => event,
            Err(error) => {
                debug!(table = %self.table, error = %error, "ignoring undecodable keyspace event");
                return;
            }
        };

        let Some(op) = TableChangeOp::from_event(&event) else {
            debug!(table = %self.table, event = %event, "ignoring unrelated keyspace event");
            return;
        };

        counter!(
            NATMGR_TABLE_CHANGES_TOTAL,
            TABLE_NAME_LABEL => self.table.clone()
        )
        .increment(1);

        self.pending.push_back(TableChange { key, op });
    }
}

#[async_trait::async_trait]
impl<H: TableChangeHandler> EventSource for TableWatchSource<H> {
    fn name(&self) -> &str {
        &self.table
    }

    async fn ready(&mut self) -> NatResult<()> {
        while self.pending.is_empty() {
            match self.rx.recv().await {
                Ok(message) => self.buffer(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        table = %self.table,
                        skipped,
                        "table watch lagged behind keyspace events"
                    );
                }
                Err(RecvError::Closed) => {
                    bail!(
                        ErrorKind::SubscriptionLost,
                        "Table subscription lost",
                        format!("the keyspace event stream for table `{}` closed", self.table)
                    );
                }
            }
        }

        Ok(())
    }

    async fn handle(&mut self) -> NatResult<()> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.buffer(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(
                        table = %self.table,
                        skipped,
                        "table watch lagged behind keyspace events"
                    );
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if self.pending.is_empty() {
            return Ok(());
        }

        let changes: Vec<TableChange> = self.pending.drain(..).collect();
        debug!(table = %self.table, changes = changes.len(), "dispatching table changes");

        self.handler.on_changes(&self.table, changes).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use fred::bytes_utils::Str;
    use fred::prelude::Server;
    use fred::types::{Message, MessageKind, Value};
    use tokio::sync::broadcast;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingHandler {
        batches: Arc<Mutex<Vec<(String, Vec<TableChange>)>>>,
    }

    #[async_trait::async_trait]
    impl TableChangeHandler for RecordingHandler {
        async fn on_changes(&mut self, table: &str, changes: Vec<TableChange>) -> NatResult<()> {
            self.batches
                .lock()
                .unwrap()
                .push((table.to_owned(), changes));

            Ok(())
        }
    }

    fn keyspace_message(channel: &str, event: &str) -> Message {
        Message {
            channel: Str::from(channel),
            value: Value::from(event),
            kind: MessageKind::PMessage,
            server: Server::new("localhost", 6379),
        }
    }

    #[test]
    fn classifies_keyspace_events() {
        assert_eq!(TableChangeOp::from_event("hset"), Some(TableChangeOp::Set));
        assert_eq!(
            TableChangeOp::from_event("hdel"),
            Some(TableChangeOp::Set),
            "a partial field delete leaves the entry in place"
        );
        assert_eq!(TableChangeOp::from_event("del"), Some(TableChangeOp::Del));
        assert_eq!(
            TableChangeOp::from_event("unlink"),
            Some(TableChangeOp::Del)
        );
        assert_eq!(
            TableChangeOp::from_event("expired"),
            Some(TableChangeOp::Del)
        );
        assert_eq!(TableChangeOp::from_event("lpush"), None);
    }

    #[test]
    fn builds_keyspace_prefix_with_database_index() {
        assert_eq!(
            keyspace_prefix(StoreDb::Config, "NAT_POOL"),
            "__keyspace@4__:NAT_POOL|"
        );
    }

    #[tokio::test]
    async fn buffers_events_and_dispatches_them_as_one_batch() {
        let (tx, rx) = broadcast::channel(16);
        let handler = RecordingHandler::default();
        let batches = handler.batches.clone();

        let mut source = TableWatchSource::new(StoreDb::Config, "NAT_POOL", rx, handler);

        tx.send(keyspace_message("__keyspace@4__:NAT_POOL|pool1", "hset"))
            .unwrap();
        tx.send(keyspace_message("__keyspace@4__:NAT_POOL|pool2", "del"))
            .unwrap();

        source.ready().await.unwrap();
        source.handle().await.unwrap();

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);

        let (table, changes) = &batches[0];
        assert_eq!(table, "NAT_POOL");
        assert_eq!(
            changes,
            &vec![
                TableChange {
                    key: "pool1".to_owned(),
                    op: TableChangeOp::Set,
                },
                TableChange {
                    key: "pool2".to_owned(),
                    op: TableChangeOp::Del,
                },
            ]
        );
    }

    #[tokio::test]
    async fn ignores_events_from_other_tables() {
        let (tx, rx) = broadcast::channel(16);
        let handler = RecordingHandler::default();
        let batches = handler.batches.clone();

        let mut source = TableWatchSource::new(StoreDb::Config, "NAT_POOL", rx, handler);

        tx.send(keyspace_message("__keyspace@4__:NAT_BINDINGS|b1", "hset"))
            .unwrap();
        tx.send(keyspace_message("__keyspace@4__:NAT_POOL|pool1", "hset"))
            .unwrap();

        source.ready().await.unwrap();
        source.handle().await.unwrap();

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].1.len(), 1);
        assert_eq!(batches[0].1[0].key, "pool1");
    }

    #[tokio::test]
    async fn ignores_unrelated_keyspace_events() {
        let (tx, rx) = broadcast::channel(16);
        let handler = RecordingHandler::default();
        let batches = handler.batches.clone();

        let mut source = TableWatchSource::new(StoreDb::Config, "NAT_POOL", rx, handler);

        tx.send(keyspace_message("__keyspace@4__:NAT_POOL|pool1", "lpush"))
            .unwrap();

        source.handle().await.unwrap();

        assert!(batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_stream_surfaces_a_lost_subscription() {
        let (tx, rx) = broadcast::channel::<Message>(16);
        let handler = RecordingHandler::default();

        let mut source = TableWatchSource::new(StoreDb::Config, "NAT_POOL", rx, handler);
        drop(tx);

        let error = source.ready().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SubscriptionLost);
    }

    #[tokio::test]
    async fn recovers_after_lagging_behind_the_stream() {
        let (tx, rx) = broadcast::channel(1);
        let handler = RecordingHandler::default();
        let batches = handler.batches.clone();

        let mut source = TableWatchSource::new(StoreDb::Config, "NAT_POOL", rx, handler);

        tx.send(keyspace_message("__keyspace@4__:NAT_POOL|pool1", "hset"))
            .unwrap();
        tx.send(keyspace_message("__keyspace@4__:NAT_POOL|pool2", "hset"))
            .unwrap();

        source.ready().await.unwrap();
        source.handle().await.unwrap();

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].1.len(), 1);
        assert_eq!(batches[0].1[0].key, "pool2");
    }

    #[tokio::test]
    async fn handle_without_buffered_changes_is_a_noop() {
        let (tx, rx) = broadcast::channel::<Message>(16);
        let handler = RecordingHandler::default();
        let batches = handler.batches.clone();

        let mut source = TableWatchSource::new(StoreDb::Config, "NAT_POOL", rx, handler);

        source.handle().await.unwrap();

        assert!(batches.lock().unwrap().is_empty());
        drop(tx);
    }
}
