//! Main-surface manager.
//!
//! The main surface is created lazily on the first [`MainWindow::focus`] and
//! focused (not duplicated) on later calls.  When the user closes it, the
//! manager forgets it, and the next `focus` opens a fresh one.
//!
//! The last session id reported by a signal host is remembered and sent to
//! every main surface once it has announced readiness.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sv_core::{Notification, PageKind, SurfaceId};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::event_router::EventRouter;
use crate::infrastructure::ui_surface::{self, ReadySignal, SurfaceError, SurfaceFactory, UiSurface};

#[derive(Default)]
struct WindowState {
    surface: Option<Arc<dyn UiSurface>>,
    ready: bool,
    session_id: Option<String>,
    watcher: Option<JoinHandle<()>>,
}

impl WindowState {
    fn is_current(&self, id: SurfaceId) -> bool {
        self.surface.as_ref().is_some_and(|s| s.id() == id)
    }

    fn forget(&mut self) -> Option<Arc<dyn UiSurface>> {
        self.ready = false;
        self.surface.take()
    }
}

/// Owns the (at most one) main surface.
pub struct MainWindow {
    surfaces: Arc<dyn SurfaceFactory>,
    router: EventRouter,
    ready_timeout: Option<Duration>,
    state: Arc<Mutex<WindowState>>,
}

impl MainWindow {
    pub fn new(
        surfaces: Arc<dyn SurfaceFactory>,
        router: EventRouter,
        ready_timeout: Option<Duration>,
    ) -> Self {
        Self {
            surfaces,
            router,
            ready_timeout,
            state: Arc::new(Mutex::new(WindowState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Focuses the main surface, opening it first if there is none.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::OpenFailed`] if a new surface cannot be opened.
    pub fn focus(&self) -> Result<SurfaceId, SurfaceError> {
        let mut state = self.lock();
        if let Some(surface) = state.surface.as_ref().filter(|s| s.is_alive()) {
            surface.focus();
            return Ok(surface.id());
        }

        let surface = self.surfaces.open(PageKind::Main)?;
        let id = surface.id();
        let ready = ReadySignal::listen(&self.router, id, self.ready_timeout);
        info!(surface = %id, "main surface opened");

        if let Some(previous) = state.watcher.take() {
            previous.abort();
        }
        state.watcher = Some(tokio::spawn(watch_surface(
            Arc::clone(&self.state),
            Arc::clone(&surface),
            ready,
        )));
        state.surface = Some(surface);
        state.ready = false;
        Ok(id)
    }

    /// Remembers `formatted` and shows it on the main surface if one is ready.
    pub fn show_session_id(&self, formatted: String) {
        let mut state = self.lock();
        state.session_id = Some(formatted.clone());
        if !state.ready {
            debug!("session id held until the main surface is ready");
            return;
        }
        if let Some(surface) = &state.surface {
            if let Err(e) = surface.send(Notification::SessionId { id: formatted }) {
                debug!("session id not delivered: {e}");
            }
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.lock().surface.as_ref().map(|s| s.id())
    }

    /// Closes the main surface, if any.
    pub fn close(&self) {
        let (surface, watcher) = {
            let mut state = self.lock();
            (state.forget(), state.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(surface) = surface {
            surface.close();
        }
    }
}

impl Drop for MainWindow {
    fn drop(&mut self) {
        if let Some(watcher) = self.lock().watcher.take() {
            watcher.abort();
        }
    }
}

/// Waits for readiness, replays the session id, then clears the slot when
/// the surface closes.
async fn watch_surface(
    state: Arc<Mutex<WindowState>>,
    surface: Arc<dyn UiSurface>,
    ready: ReadySignal,
) {
    let id = surface.id();
    let closed = ui_surface::closed(surface.lifecycle());
    tokio::pin!(closed);

    tokio::select! {
        _ = &mut closed => {}
        result = ready.wait() => {
            match result {
                Ok(()) => {
                    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if guard.is_current(id) {
                        guard.ready = true;
                        if let Some(session_id) = guard.session_id.clone() {
                            if let Err(e) = surface.send(Notification::SessionId { id: session_id }) {
                                debug!("session id not delivered: {e}");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("main surface never became ready: {e}");
                    surface.close();
                }
            }
            closed.await;
        }
    }

    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_current(id) {
        guard.forget();
        guard.watcher = None;
        info!(surface = %id, "main surface closed");
    }
}
