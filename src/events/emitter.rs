use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::Event;

/// Sink for agent events. Implementations must not fail the caller: a
/// closed or absent listener simply drops the event.
#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Discards everything.
pub struct NoopEmitter;

#[async_trait]
impl Emitter for NoopEmitter {
    async fn emit(&self, _event: Event) {}
}

/// Emitter backed by a bounded tokio channel.
///
/// The receiving half is handed out once through [`ChanEmitter::subscribe`].
/// When the buffer is full `emit` waits for the reader.
pub struct ChanEmitter {
    tx: RwLock<Option<mpsc::Sender<Event>>>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
}

impl ChanEmitter {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            tx: RwLock::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Emitter and its receiving half; `subscribe` on the result returns `None`.
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let emitter = Self {
            tx: RwLock::new(Some(tx)),
            rx: Mutex::new(None),
        };
        (emitter, rx)
    }

    /// Take the receiving half. Returns `None` after the first call.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<Event>> {
        self.rx.lock().take()
    }

    /// Stop accepting events. The receiver drains what is buffered and then
    /// sees the end of the stream.
    pub fn close(&self) {
        self.tx.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.read().as_ref().map_or(true, |tx| tx.is_closed())
    }
}

#[async_trait]
impl Emitter for ChanEmitter {
    async fn emit(&self, event: Event) {
        // Clone out of the lock; the send may wait.
        let tx = self.tx.read().clone();
        if let Some(tx) = tx {
            if tx.send(event).await.is_err() {
                log::debug!("event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_events_arrive_in_order_until_close() {
        let emitter = ChanEmitter::new(8);
        let mut rx = emitter.subscribe().unwrap();
        assert!(emitter.subscribe().is_none());

        emitter.emit(EventKind::Thinking { query: "q".into() }.into()).await;
        emitter.emit(EventKind::Done { content: "a".into() }.into()).await;
        emitter.close();
        emitter.emit(EventKind::Message { content: "late".into() }.into()).await;

        assert!(matches!(rx.recv().await.unwrap().kind, EventKind::Thinking { .. }));
        assert!(rx.recv().await.unwrap().is_terminal());
        assert!(rx.recv().await.is_none());
        assert!(emitter.is_closed());
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_is_silent() {
        let emitter = ChanEmitter::new(1);
        drop(emitter.subscribe());
        emitter.emit(EventKind::Error { message: "x".into() }.into()).await;
        assert!(emitter.is_closed());
    }
}
