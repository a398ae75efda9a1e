use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::bail;
use crate::error::{ErrorKind, NatResult};
use crate::source::EventSource;

/// Items a test can script onto a [`QueueSource`].
enum QueueItem {
    /// A regular event, drained into the handled list on dispatch.
    Event(u64),
    /// Makes the pending readiness wait fail once.
    ReadyError,
    /// Buffers like an event but fails the handler that drains it.
    HandleError,
}

/// In-memory event source scripted by the test through its handle.
///
/// Mirrors the contract real sources implement: readiness buffers whatever
/// arrives so a lost readiness race never drops an event, and the handler
/// drains only what has already been received.
pub struct QueueSource {
    name: String,
    rx: mpsc::UnboundedReceiver<QueueItem>,
    pending: VecDeque<QueueItem>,
    handled: Arc<Mutex<Vec<u64>>>,
}

/// Test-side handle feeding a [`QueueSource`] and observing its dispatches.
#[derive(Clone)]
pub struct QueueSourceHandle {
    tx: mpsc::UnboundedSender<QueueItem>,
    handled: Arc<Mutex<Vec<u64>>>,
}

impl QueueSource {
    /// Creates a source and the handle that scripts it.
    pub fn new(name: &str) -> (Self, QueueSourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handled = Arc::new(Mutex::new(Vec::new()));

        let source = Self {
            name: name.to_owned(),
            rx,
            pending: VecDeque::new(),
            handled: handled.clone(),
        };
        let handle = QueueSourceHandle { tx, handled };

        (source, handle)
    }

    fn buffer(&mut self, item: QueueItem) -> NatResult<()> {
        match item {
            QueueItem::ReadyError => {
                bail!(
                    ErrorKind::StoreError,
                    "Event source wait was scripted to fail",
                    self.name.clone()
                );
            }
            item => {
                self.pending.push_back(item);
                Ok(())
            }
        }
    }
}

impl QueueSourceHandle {
    /// Enqueues one event for the source to observe.
    pub fn send(&self, event: u64) {
        self.tx
            .send(QueueItem::Event(event))
            .expect("queue source was dropped");
    }

    /// Makes the source's next readiness wait fail transiently.
    pub fn send_ready_error(&self) {
        self.tx
            .send(QueueItem::ReadyError)
            .expect("queue source was dropped");
    }

    /// Enqueues an item whose dispatch fails the handler.
    pub fn send_handle_error(&self) {
        self.tx
            .send(QueueItem::HandleError)
            .expect("queue source was dropped");
    }

    /// Returns every event the source has dispatched so far, in order.
    pub fn handled(&self) -> Vec<u64> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventSource for QueueSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ready(&mut self) -> NatResult<()> {
        while self.pending.is_empty() {
            match self.rx.recv().await {
                Some(item) => self.buffer(item)?,
                None => {
                    bail!(
                        ErrorKind::SubscriptionLost,
                        "Scripted event stream closed",
                        self.name.clone()
                    );
                }
            }
        }

        Ok(())
    }

    async fn handle(&mut self) -> NatResult<()> {
        while let Ok(item) = self.rx.try_recv() {
            self.buffer(item)?;
        }

        while let Some(item) = self.pending.pop_front() {
            match item {
                QueueItem::Event(event) => self.handled.lock().unwrap().push(event),
                QueueItem::HandleError => {
                    bail!(
                        ErrorKind::Unknown,
                        "Event dispatch was scripted to fail",
                        self.name.clone()
                    );
                }
                QueueItem::ReadyError => unreachable!("ready errors are never buffered"),
            }
        }

        Ok(())
    }
}
