//! One-time readiness handshake with a freshly opened surface.
//!
//! A surface cannot receive notifications until its page has loaded and
//! announced [`Command::RendererReady`].  [`ReadySignal::listen`] must be
//! called right after the surface is opened, before anything could possibly
//! announce readiness, so the announcement is never missed.  The timeout is
//! measured from that moment, not from when somebody starts waiting.
//!
//! [`Command::RendererReady`]: sv_core::Command::RendererReady

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sv_core::{CommandKind, SurfaceId};
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};

use super::SurfaceError;
use crate::infrastructure::event_router::{EventRouter, Subscription};

/// How long a surface gets to announce readiness.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(1000);

/// A pending readiness announcement from one surface.
#[derive(Debug)]
pub struct ReadySignal {
    surface: SurfaceId,
    rx: oneshot::Receiver<()>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    _subscription: Subscription,
}

impl ReadySignal {
    /// Starts listening for `surface`'s readiness announcement.
    ///
    /// `timeout = None` waits indefinitely.
    pub fn listen(router: &EventRouter, surface: SurfaceId, timeout: Option<Duration>) -> Self {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let subscription = router.subscribe(CommandKind::RendererReady, Some(surface), move |_| {
            if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(());
            }
        });

        Self {
            surface,
            rx,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
            _subscription: subscription,
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Waits for the announcement.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::ReadyTimeout`] if the deadline passes first.
    pub async fn wait(self) -> Result<(), SurfaceError> {
        let Self {
            surface,
            rx,
            timeout,
            deadline,
            _subscription,
        } = self;

        let outcome = match deadline {
            None => rx.await,
            Some(deadline) => match timeout_at(deadline, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SurfaceError::ReadyTimeout {
                        surface,
                        timeout: timeout.unwrap_or_default(),
                    })
                }
            },
        };
        outcome.map_err(|_| SurfaceError::Closed(surface))
    }
}
