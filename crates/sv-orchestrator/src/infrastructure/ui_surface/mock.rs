//! Mock UI surfaces for unit and integration testing.
//!
//! A [`MockSurface`] records every notification and every window-chrome call
//! so tests can assert on exactly what a page would have seen.  Tests drive
//! lifecycle transitions by hand: [`MockSurface::close`] (user closes the
//! window), [`MockSurface::reload`] (page starts loading again), and
//! [`MockSurface::vanish`] (presentation context disappears without a close
//! notification).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use sv_core::{Notification, PageKind, SurfaceId};
use tokio::sync::watch;

use super::{SurfaceError, SurfaceFactory, SurfaceState, UiSurface};

#[derive(Debug, Default)]
struct SurfaceLog {
    notifications: Vec<Notification>,
    alive: bool,
    close_calls: usize,
    focus_calls: usize,
    enter_selection_calls: usize,
    exit_selection_calls: usize,
}

/// A recording [`UiSurface`].
#[derive(Debug)]
pub struct MockSurface {
    id: SurfaceId,
    page: PageKind,
    state: watch::Sender<SurfaceState>,
    log: Mutex<SurfaceLog>,
}

impl MockSurface {
    pub fn new(id: SurfaceId, page: PageKind) -> Arc<Self> {
        let (state, _) = watch::channel(SurfaceState::default());
        Arc::new(Self {
            id,
            page,
            state,
            log: Mutex::new(SurfaceLog {
                alive: true,
                ..SurfaceLog::default()
            }),
        })
    }

    fn log(&self) -> std::sync::MutexGuard<'_, SurfaceLog> {
        self.log.lock().expect("lock poisoned")
    }

    /// Every notification delivered so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.log().notifications.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.log().close_calls
    }

    pub fn focus_calls(&self) -> usize {
        self.log().focus_calls
    }

    pub fn enter_selection_calls(&self) -> usize {
        self.log().enter_selection_calls
    }

    pub fn exit_selection_calls(&self) -> usize {
        self.log().exit_selection_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Simulates the page starting to load again.
    pub fn reload(&self) {
        self.state.send_modify(|s| s.generation += 1);
    }

    /// Simulates the presentation context disappearing without any close
    /// notification reaching the orchestrator.
    pub fn vanish(&self) {
        self.log().alive = false;
    }
}

impl UiSurface for MockSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn page(&self) -> PageKind {
        self.page
    }

    fn send(&self, notification: Notification) -> Result<(), SurfaceError> {
        let mut log = self.log();
        if !log.alive {
            return Err(SurfaceError::Closed(self.id));
        }
        log.notifications.push(notification);
        Ok(())
    }

    fn lifecycle(&self) -> watch::Receiver<SurfaceState> {
        self.state.subscribe()
    }

    fn is_alive(&self) -> bool {
        self.log().alive
    }

    fn close(&self) {
        {
            let mut log = self.log();
            log.close_calls += 1;
            log.alive = false;
        }
        self.state
            .send_if_modified(|s| !std::mem::replace(&mut s.closed, true));
    }

    fn focus(&self) {
        self.log().focus_calls += 1;
    }

    fn enter_selection_mode(&self) {
        self.log().enter_selection_calls += 1;
    }

    fn exit_selection_mode(&self) {
        self.log().exit_selection_calls += 1;
    }
}

/// A [`SurfaceFactory`] that hands out [`MockSurface`]s with sequential ids.
#[derive(Debug, Default)]
pub struct MockSurfaceFactory {
    next_id: AtomicU32,
    surfaces: Mutex<Vec<Arc<MockSurface>>>,
}

impl MockSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every surface ever opened, in order.
    pub fn surfaces(&self) -> Vec<Arc<MockSurface>> {
        self.surfaces.lock().expect("lock poisoned").clone()
    }

    /// Every surface ever opened for `page`, in order.
    pub fn opened(&self, page: PageKind) -> Vec<Arc<MockSurface>> {
        self.surfaces()
            .into_iter()
            .filter(|s| s.page == page)
            .collect()
    }

    /// The most recently opened surface for `page`.
    pub fn last(&self, page: PageKind) -> Option<Arc<MockSurface>> {
        self.opened(page).pop()
    }

    pub fn get(&self, id: SurfaceId) -> Option<Arc<MockSurface>> {
        self.surfaces().into_iter().find(|s| s.id == id)
    }
}

impl SurfaceFactory for MockSurfaceFactory {
    fn open(&self, page: PageKind) -> Result<Arc<dyn UiSurface>, SurfaceError> {
        let id = SurfaceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let surface = MockSurface::new(id, page);
        self.surfaces
            .lock()
            .expect("lock poisoned")
            .push(surface.clone());
        Ok(surface)
    }

    fn find(&self, id: SurfaceId) -> Option<Arc<dyn UiSurface>> {
        self.get(id)
            .filter(|s| s.is_alive())
            .map(|s| s as Arc<dyn UiSurface>)
    }
}
