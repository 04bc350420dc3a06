//! Desktop enumeration stream coordinator.
//!
//! While the host surface shows its display picker, the engine pushes batches
//! of capture-source thumbnails.  A [`DesktopListStream`] owns one such
//! subscription for one surface and ends it on whichever of these happens
//! first:
//!
//! | Trigger        | Source                                                  |
//! |----------------|---------------------------------------------------------|
//! | stop requested | `HostStopDesktopList` from the same surface             |
//! | reloaded       | the surface's lifecycle generation changed              |
//! | closed         | the surface's lifecycle reported it destroyed           |
//! | vanished       | the surface is gone when a batch is about to be sent    |
//! | replaced/drop  | the owning host manager started a new stream or left    |
//!
//! All triggers funnel into one transition, `Starting | Active → Cancelled`,
//! taken under the same lock the delivery path holds.  Whoever takes it runs
//! the cleanup (close the engine stream, leave selection mode, drop the stop
//! listener); everyone else gets `false`.  Because delivery checks the state
//! under that lock, no batch reaches the surface once cancellation has been
//! acknowledged.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use sv_core::{CommandKind, NativeThumbnail, Notification, SurfaceId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::infrastructure::engine::{EngineError, ProtocolEngine, ThumbnailStreamId};
use crate::infrastructure::event_router::{EventRouter, Subscription};
use crate::infrastructure::ui_surface::{next_change, LifecycleChange, UiSurface};

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    StopRequested,
    SurfaceReloaded,
    SurfaceClosed,
    SurfaceVanished,
    Replaced,
    Dropped,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StopRequested => "stop requested",
            Self::SurfaceReloaded => "surface reloaded",
            Self::SurfaceClosed => "surface closed",
            Self::SurfaceVanished => "surface vanished",
            Self::Replaced => "replaced by a new stream",
            Self::Dropped => "owner dropped",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    /// `thumbnails()` has not returned yet.
    Starting,
    Active(ThumbnailStreamId),
    Cancelled,
}

struct Shared {
    engine: Arc<dyn ProtocolEngine>,
    surface: Arc<dyn UiSurface>,
    state: Mutex<StreamState>,
    token: CancellationToken,
    stop_listener: Mutex<Option<Subscription>>,
    delivered: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the cancel transition.  Returns the stream to close (if any) for
    /// the caller that won, `None` for everyone else.
    fn mark_cancelled(state: &mut StreamState) -> Option<Option<ThumbnailStreamId>> {
        match std::mem::replace(state, StreamState::Cancelled) {
            StreamState::Cancelled => None,
            StreamState::Starting => Some(None),
            StreamState::Active(id) => Some(Some(id)),
        }
    }

    fn cancel(&self, reason: CancelReason) -> bool {
        let won = Self::mark_cancelled(&mut self.state());
        match won {
            Some(stream) => {
                self.finish_cancel(stream, reason);
                true
            }
            None => {
                trace!(surface = %self.surface.id(), %reason, "desktop list already cancelled");
                false
            }
        }
    }

    fn finish_cancel(&self, stream: Option<ThumbnailStreamId>, reason: CancelReason) {
        self.token.cancel();
        if let Some(stream) = stream {
            self.engine.close_thumbnails(stream);
        }
        self.surface.exit_selection_mode();
        let listener = self
            .stop_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(listener);
        info!(
            surface = %self.surface.id(),
            %reason,
            batches = self.delivered.load(Ordering::Acquire),
            "desktop list stopped"
        );
    }

    fn deliver(&self, batch: Vec<NativeThumbnail>) {
        let mut state = self.state();
        if *state == StreamState::Cancelled {
            trace!(surface = %self.surface.id(), "batch after cancel dropped");
            return;
        }

        let sent = self.surface.is_alive()
            && self
                .surface
                .send(Notification::DesktopList { thumbnails: batch })
                .is_ok();

        if sent {
            self.delivered.fetch_add(1, Ordering::AcqRel);
            return;
        }

        // The surface disappeared without the lifecycle channel telling us.
        debug!(surface = %self.surface.id(), "surface gone before batch delivery");
        let won = Self::mark_cancelled(&mut state);
        drop(state);
        if let Some(stream) = won {
            self.finish_cancel(stream, CancelReason::SurfaceVanished);
        }
    }
}

/// One active thumbnail subscription for one surface.
pub struct DesktopListStream {
    shared: Arc<Shared>,
}

impl DesktopListStream {
    /// Enters selection mode on `surface` and starts streaming thumbnails to it.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates the engine's refusal to start the stream; selection mode is
    /// left again before returning.
    pub fn start(
        engine: Arc<dyn ProtocolEngine>,
        router: &EventRouter,
        surface: Arc<dyn UiSurface>,
    ) -> Result<Self, EngineError> {
        let surface_id = surface.id();
        let shared = Arc::new(Shared {
            engine: Arc::clone(&engine),
            surface: Arc::clone(&surface),
            state: Mutex::new(StreamState::Starting),
            token: CancellationToken::new(),
            stop_listener: Mutex::new(None),
            delivered: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&shared);
        let listener = router.subscribe(
            CommandKind::HostStopDesktopList,
            Some(surface_id),
            move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.cancel(CancelReason::StopRequested);
                }
            },
        );
        *shared
            .stop_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);

        spawn_lifecycle_watch(&shared, surface.as_ref());

        surface.enter_selection_mode();

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let started = engine.thumbnails(Box::new(move |batch| {
            if let Some(shared) = weak.upgrade() {
                shared.deliver(batch);
            }
        }));

        match started {
            Ok(stream) => {
                let mut state = shared.state();
                if *state == StreamState::Starting {
                    *state = StreamState::Active(stream);
                    drop(state);
                    debug!(surface = %surface_id, %stream, "desktop list started");
                } else {
                    // Cancelled while the engine was still setting up.
                    drop(state);
                    engine.close_thumbnails(stream);
                }
                Ok(Self { shared })
            }
            Err(e) => {
                shared.cancel(CancelReason::Dropped);
                Err(e)
            }
        }
    }

    /// Ends the stream.  Returns `true` only for the call that actually did.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.shared.cancel(reason)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Resolves once the stream has been cancelled by any trigger.
    pub fn cancelled_token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.shared.surface.id()
    }

    pub fn stream_id(&self) -> Option<ThumbnailStreamId> {
        match *self.shared.state() {
            StreamState::Active(id) => Some(id),
            _ => None,
        }
    }

    /// Number of batches that reached the surface.
    pub fn batches_delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::Acquire)
    }
}

impl Drop for DesktopListStream {
    fn drop(&mut self) {
        self.shared.cancel(CancelReason::Dropped);
    }
}

fn spawn_lifecycle_watch(shared: &Arc<Shared>, surface: &dyn UiSurface) {
    let lifecycle = surface.lifecycle();
    let generation = lifecycle.borrow().generation;
    let token = shared.token.clone();
    let weak = Arc::downgrade(shared);

    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            change = next_change(lifecycle, generation) => {
                if let Some(shared) = weak.upgrade() {
                    let reason = match change {
                        LifecycleChange::Reloaded => CancelReason::SurfaceReloaded,
                        LifecycleChange::Closed => CancelReason::SurfaceClosed,
                    };
                    shared.cancel(reason);
                }
            }
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::engine::mock::MockEngine;
    use crate::infrastructure::ui_surface::mock::MockSurface;
    use sv_core::{Command, DisplayType, PageKind};

    fn batch(n: u32) -> Vec<NativeThumbnail> {
        (0..n)
            .map(|i| NativeThumbnail {
                data: vec![0xAB],
                name: format!("Display {i}"),
                native_id: i,
                display_type: DisplayType::Monitor,
            })
            .collect()
    }

    fn setup() -> (Arc<MockEngine>, EventRouter, Arc<MockSurface>) {
        (
            Arc::new(MockEngine::new()),
            EventRouter::detached(),
            MockSurface::new(SurfaceId(1), PageKind::SignalHost),
        )
    }

    fn desktop_lists(surface: &MockSurface) -> usize {
        surface
            .notifications()
            .iter()
            .filter(|n| matches!(n, Notification::DesktopList { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_start_enters_selection_mode_and_delivers() {
        // Arrange
        let (engine, router, surface) = setup();

        // Act
        let list = DesktopListStream::start(engine.clone(), &router, surface.clone()).unwrap();
        let stream = list.stream_id().unwrap();
        engine.push_thumbnails(stream, batch(2));

        // Assert
        assert_eq!(surface.enter_selection_calls(), 1);
        assert_eq!(desktop_lists(&surface), 1);
        assert_eq!(list.batches_delivered(), 1);
    }

    #[tokio::test]
    async fn test_stop_command_cancels_once_and_restores_selection_mode() {
        // Arrange
        let (engine, router, surface) = setup();
        let list = DesktopListStream::start(engine.clone(), &router, surface.clone()).unwrap();
        let stream = list.stream_id().unwrap();

        // Act
        router.dispatch(SurfaceId(1), Command::HostStopDesktopList);
        let second = list.cancel(CancelReason::StopRequested);
        engine.push_thumbnails(stream, batch(1));

        // Assert
        assert!(!second);
        assert!(list.is_cancelled());
        assert_eq!(engine.thumbnail_close_count(stream), 1);
        assert_eq!(surface.exit_selection_calls(), 1);
        assert_eq!(desktop_lists(&surface), 0);
        assert_eq!(router.listener_count(CommandKind::HostStopDesktopList), 0);
    }

    #[tokio::test]
    async fn test_stop_from_other_surface_is_ignored() {
        let (engine, router, surface) = setup();
        let list = DesktopListStream::start(engine.clone(), &router, surface.clone()).unwrap();

        router.dispatch(SurfaceId(2), Command::HostStopDesktopList);

        assert!(!list.is_cancelled());
    }

    #[tokio::test]
    async fn test_vanished_surface_cancels_inside_delivery() {
        // Arrange
        let (engine, router, surface) = setup();
        let list = DesktopListStream::start(engine.clone(), &router, surface.clone()).unwrap();
        let stream = list.stream_id().unwrap();
        surface.vanish();

        // Act
        engine.push_thumbnails(stream, batch(3));

        // Assert
        assert!(list.is_cancelled());
        assert_eq!(engine.thumbnail_close_count(stream), 1);
        assert_eq!(engine.open_stream_count(), 0);
        assert_eq!(surface.exit_selection_calls(), 1);
        assert_eq!(list.batches_delivered(), 0);
    }

    #[tokio::test]
    async fn test_reload_cancels_stream() {
        // Arrange
        let (engine, router, surface) = setup();
        let list = DesktopListStream::start(engine.clone(), &router, surface.clone()).unwrap();
        let token = list.cancelled_token();

        // Act
        surface.reload();
        tokio::time::timeout(std::time::Duration::from_secs(1), token.cancelled())
            .await
            .expect("reload must cancel the stream");

        // Assert
        assert_eq!(surface.exit_selection_calls(), 1);
        assert!(!list.cancel(CancelReason::StopRequested));
    }

    #[tokio::test]
    async fn test_drop_cancels_stream() {
        let (engine, router, surface) = setup();
        let list = DesktopListStream::start(engine.clone(), &router, surface.clone()).unwrap();
        let stream = list.stream_id().unwrap();

        drop(list);

        assert_eq!(engine.thumbnail_close_count(stream), 1);
        assert_eq!(surface.exit_selection_calls(), 1);
    }
}
