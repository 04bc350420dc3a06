//! Line-oriented stand-in for a windowing layer.
//!
//! Each surface writes its notifications to stdout as one JSON object per
//! line, and [`run_command_shell`] reads commands from stdin in the same
//! shape, so the orchestrator binary can be driven by a script or a pipe:
//!
//! ```text
//! → {"surface":1,"command":{"type":"renderer_ready"}}
//! → {"surface":1,"command":{"type":"establish_session","id":"10.0.0.5:9051"}}
//! ← {"surface":2,"page":"client","notification":{"type":"connection_failed",...}}
//! → {"surface":2,"close":true}
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sv_core::{Command, Notification, PageKind, SurfaceId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{SurfaceError, SurfaceFactory, SurfaceState, UiSurface};
use crate::infrastructure::event_router::EventRouter;

#[derive(Serialize)]
struct OutputLine<'a> {
    surface: SurfaceId,
    page: PageKind,
    notification: &'a Notification,
}

/// One line read by [`run_command_shell`].
#[derive(Debug, Deserialize, PartialEq)]
pub struct ShellLine {
    pub surface: SurfaceId,
    #[serde(default)]
    pub command: Option<Command>,
    /// Closes the surface as if the user closed its window.
    #[serde(default)]
    pub close: bool,
}

pub struct HeadlessSurface {
    id: SurfaceId,
    page: PageKind,
    alive: AtomicBool,
    state: watch::Sender<SurfaceState>,
}

impl HeadlessSurface {
    fn new(id: SurfaceId, page: PageKind) -> Self {
        let (state, _) = watch::channel(SurfaceState::default());
        Self {
            id,
            page,
            alive: AtomicBool::new(true),
            state,
        }
    }
}

impl UiSurface for HeadlessSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn page(&self) -> PageKind {
        self.page
    }

    fn send(&self, notification: Notification) -> Result<(), SurfaceError> {
        if !self.is_alive() {
            return Err(SurfaceError::Closed(self.id));
        }
        let line = OutputLine {
            surface: self.id,
            page: self.page,
            notification: &notification,
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{json}") {
                    warn!(surface = %self.id, "failed to write notification: {e}");
                }
            }
            Err(e) => warn!(surface = %self.id, "failed to encode notification: {e}"),
        }
        Ok(())
    }

    fn lifecycle(&self) -> watch::Receiver<SurfaceState> {
        self.state.subscribe()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!(surface = %self.id, page = ?self.page, "surface closed");
        }
        self.state
            .send_if_modified(|s| !std::mem::replace(&mut s.closed, true));
    }

    fn focus(&self) {
        debug!(surface = %self.id, "focus");
    }

    fn enter_selection_mode(&self) {
        debug!(surface = %self.id, "entering selection mode");
    }

    fn exit_selection_mode(&self) {
        debug!(surface = %self.id, "leaving selection mode");
    }
}

/// Opens [`HeadlessSurface`]s with sequential ids starting at 1.
#[derive(Default)]
pub struct HeadlessSurfaceFactory {
    next_id: AtomicU32,
    surfaces: Mutex<HashMap<SurfaceId, Arc<HeadlessSurface>>>,
}

impl HeadlessSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: SurfaceId) -> Option<Arc<HeadlessSurface>> {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

impl SurfaceFactory for HeadlessSurfaceFactory {
    fn open(&self, page: PageKind) -> Result<Arc<dyn UiSurface>, SurfaceError> {
        let id = SurfaceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let surface = Arc::new(HeadlessSurface::new(id, page));
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        surfaces.retain(|_, s| s.is_alive());
        surfaces.insert(id, Arc::clone(&surface));
        info!(surface = %id, ?page, "surface opened");
        Ok(surface)
    }

    fn find(&self, id: SurfaceId) -> Option<Arc<dyn UiSurface>> {
        self.get(id)
            .filter(|s| s.is_alive())
            .map(|s| s as Arc<dyn UiSurface>)
    }
}

/// Reads [`ShellLine`]s from `input` until EOF and applies them.
///
/// Malformed lines are logged and skipped.
pub async fn run_command_shell<R>(
    router: EventRouter,
    surfaces: Arc<HeadlessSurfaceFactory>,
    input: R,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: ShellLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("ignoring malformed shell line: {e}");
                continue;
            }
        };

        if let Some(command) = parsed.command {
            router.dispatch(parsed.surface, command);
        }
        if parsed.close {
            match surfaces.get(parsed.surface) {
                Some(surface) => surface.close(),
                None => debug!(surface = %parsed.surface, "close for unknown surface"),
            }
        }
    }
    debug!("command shell reached end of input");
    Ok(())
}
