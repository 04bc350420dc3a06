//! Event bridge: fan-out of one engine instance's events.
//!
//! The engine accepts exactly one [`EventSink`] per instance.  A session
//! manager, however, may want several independent observers of the same
//! instance (its own state machine, a test probe, a diagnostics tap).  The
//! bridge *holds* a list of unbounded channels and copies every event into
//! each of them, in the order the engine emitted them.
//!
//! ```text
//!  engine thread ──emit──► EventBridge ──┬──► EngineEventStream (manager)
//!                                        └──► EngineEventStream (probe)
//! ```
//!
//! A subscriber that has gone away is pruned on the next emit; it never
//! prevents delivery to the others.

use std::sync::{Mutex, PoisonError};

use sv_core::EngineEvent;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::infrastructure::engine::EventSink;

/// Multi-subscriber adapter over the engine's single callback.
#[derive(Default)]
pub struct EventBridge {
    subscribers: Mutex<Vec<UnboundedSender<EngineEvent>>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new stream that receives every event emitted from now on.
    pub fn subscribe(&self) -> EngineEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        EngineEventStream { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventSink for EventBridge {
    fn emit(&self, event: EngineEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        trace!(kind = ?event.kind(), subscribers = subscribers.len(), "bridging engine event");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// One subscriber's view of the bridged events.
pub struct EngineEventStream {
    rx: UnboundedReceiver<EngineEvent>,
}

impl EngineEventStream {
    /// Waits for the next event.  `None` once the bridge is gone.
    pub async fn next(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    /// Returns an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<EngineEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}
