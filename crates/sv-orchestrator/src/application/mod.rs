//! Application layer: the session managers and the orchestrator that owns them.
//!
//! # Actors (for beginners)
//!
//! Every manager in this layer is a small *actor*: one Tokio task that owns
//! all of the manager's mutable state and processes one message at a time
//! from its inbox.  Router callbacks, engine events, and surface lifecycle
//! changes never touch that state directly; they only send a message.  That
//! gives each manager the run-to-completion behaviour of a single-threaded
//! event loop while still letting independent managers run concurrently.
//!
//! ```text
//!   EventRouter ─┐
//!   EventBridge ─┼──► inbox ──► actor task (owns handle, surface, state)
//!   lifecycle  ──┘
//! ```
//!
//! # Sub-modules
//!
//! - **`client_session`** – One outgoing remote-desktop connection.
//! - **`host_session`**   – Serving this machine's displays over one transport.
//! - **`desktop_list`**   – The cancelable thumbnail stream behind the
//!   host's display picker.
//! - **`main_window`**    – Lazily created main surface and session-id display.
//! - **`orchestrator`**   – Configuration, host reconciliation, and the
//!   client registry.

use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::engine::ProtocolEngine;
use crate::infrastructure::event_router::EventRouter;
use crate::infrastructure::ui_surface::{SurfaceFactory, DEFAULT_READY_TIMEOUT};

pub mod client_session;
pub mod desktop_list;
pub mod host_session;
pub mod main_window;
pub mod orchestrator;

/// Collaborators every manager needs.
#[derive(Clone)]
pub struct SessionContext {
    pub engine: Arc<dyn ProtocolEngine>,
    pub router: EventRouter,
    pub surfaces: Arc<dyn SurfaceFactory>,
    /// How long a new surface gets to announce readiness; `None` waits forever.
    pub ready_timeout: Option<Duration>,
}

impl SessionContext {
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        router: EventRouter,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self {
            engine,
            router,
            surfaces,
            ready_timeout: Some(DEFAULT_READY_TIMEOUT),
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout = timeout;
        self
    }
}
