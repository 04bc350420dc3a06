//! UI-surface abstraction.
//!
//! A UI surface is one window showing one page.  The orchestrator never
//! renders anything; it only needs to:
//!
//! - push [`Notification`]s to a surface,
//! - learn when the surface closes or reloads ([`UiSurface::lifecycle`]),
//! - ask it to close, focus, or switch in and out of desktop-selection mode.
//!
//! # Lifecycle channel
//!
//! Every surface publishes a [`SurfaceState`] on a `tokio::sync::watch`
//! channel.  `generation` is bumped whenever the page starts loading again
//! (a reload), and `closed` flips to `true` exactly once when the surface is
//! destroyed.  Managers spawn a small watcher task per surface that turns
//! those transitions into messages for their own inbox.

use std::sync::Arc;
use std::time::Duration;

use sv_core::{Notification, PageKind, SurfaceId};
use thiserror::Error;
use tokio::sync::watch;

pub mod headless;
pub mod mock;
pub mod ready;

pub use ready::{ReadySignal, DEFAULT_READY_TIMEOUT};

/// Observable lifecycle of one surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceState {
    /// Incremented each time the page starts loading again.
    pub generation: u64,
    /// Set once the surface is destroyed.
    pub closed: bool,
}

/// Error type for UI-surface operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("{0} is closed")]
    Closed(SurfaceId),

    #[error("{surface} did not announce readiness within {timeout:?}")]
    ReadyTimeout {
        surface: SurfaceId,
        timeout: Duration,
    },

    #[error("could not open a {page:?} surface: {reason}")]
    OpenFailed { page: PageKind, reason: String },
}

/// One presentation target.
pub trait UiSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    fn page(&self) -> PageKind;

    /// Pushes a notification to the page.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::Closed`] if the surface no longer exists.
    fn send(&self, notification: Notification) -> Result<(), SurfaceError>;

    fn lifecycle(&self) -> watch::Receiver<SurfaceState>;

    /// Probes whether the underlying presentation context still exists.
    fn is_alive(&self) -> bool;

    /// Destroys the surface.  Idempotent.
    fn close(&self);

    fn focus(&self);

    /// Grows the surface to show the desktop picker and makes it resizable.
    fn enter_selection_mode(&self);

    /// Restores bar dimensions and position and makes it non-resizable.
    fn exit_selection_mode(&self);
}

/// Creates and looks up surfaces.
pub trait SurfaceFactory: Send + Sync {
    /// Opens a new surface showing `page`.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::OpenFailed`] if the windowing layer refuses.
    fn open(&self, page: PageKind) -> Result<Arc<dyn UiSurface>, SurfaceError>;

    /// Looks up a live surface by id.
    fn find(&self, id: SurfaceId) -> Option<Arc<dyn UiSurface>>;
}

/// Resolves once the lifecycle channel reports the surface closed (or its
/// sender is gone, which means the same thing).
pub async fn closed(mut lifecycle: watch::Receiver<SurfaceState>) {
    let _ = lifecycle.wait_for(|state| state.closed).await;
}

/// Outcome of waiting on a surface's lifecycle after some generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleChange {
    Reloaded,
    Closed,
}

/// Resolves on the first reload past `generation`, or on close.
pub async fn next_change(
    mut lifecycle: watch::Receiver<SurfaceState>,
    generation: u64,
) -> LifecycleChange {
    match lifecycle
        .wait_for(|state| state.closed || state.generation != generation)
        .await
    {
        Ok(state) if !state.closed => LifecycleChange::Reloaded,
        _ => LifecycleChange::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_resolves_when_flag_flips() {
        let (tx, rx) = watch::channel(SurfaceState::default());

        tx.send_modify(|s| s.closed = true);

        closed(rx).await;
    }

    #[tokio::test]
    async fn test_closed_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(SurfaceState::default());

        drop(tx);

        closed(rx).await;
    }

    #[tokio::test]
    async fn test_next_change_distinguishes_reload_from_close() {
        // Arrange
        let (tx, rx) = watch::channel(SurfaceState::default());

        // Act
        tx.send_modify(|s| s.generation += 1);
        let first = next_change(rx.clone(), 0).await;
        tx.send_modify(|s| s.closed = true);
        let second = next_change(rx, 1).await;

        // Assert
        assert_eq!(first, LifecycleChange::Reloaded);
        assert_eq!(second, LifecycleChange::Closed);
    }
}
