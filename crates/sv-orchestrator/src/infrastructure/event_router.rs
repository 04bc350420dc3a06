//! Event router: scoped publish/subscribe between UI surfaces and managers.
//!
//! # How commands flow (for beginners)
//!
//! A UI surface sends a [`Command`].  The transport that carries it (a webview
//! IPC channel, the headless shell, a test) calls [`EventRouter::dispatch`]
//! with the command and the [`SurfaceId`] it came from.  The router hands it
//! to every listener registered for that command's [`CommandKind`] whose
//! scope matches:
//!
//! ```text
//!  surface#3 ── HostStopDesktopList ──► EventRouter
//!                                          ├─► listener (scope = surface#3)   ✓ delivered
//!                                          ├─► listener (scope = surface#7)   ✗ skipped
//!                                          └─► listener (unscoped)            ✓ delivered
//! ```
//!
//! # Upstream hooks
//!
//! The transport only needs to listen on a channel while somebody cares about
//! it.  The router keeps a reference count per kind and calls
//! [`CommandUpstream::install`] on the 0 → 1 transition and
//! [`CommandUpstream::remove`] on the 1 → 0 transition, so there is never more
//! than one upstream hook per kind no matter how many listeners exist.
//!
//! # Lifetimes
//!
//! [`EventRouter::subscribe`] returns a [`Subscription`] guard.  Dropping it,
//! or calling [`Subscription::unsubscribe`] any number of times, removes the
//! listener.  The guard holds only a weak reference, so it is safe to keep one
//! past the router's own lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use sv_core::{Command, CommandKind, SurfaceId};
use tracing::{debug, trace};

/// The transport-side subscription a router drives.
pub trait CommandUpstream: Send + Sync {
    /// Start listening for `kind` on the transport.
    fn install(&self, kind: CommandKind);
    /// Stop listening for `kind` on the transport.
    fn remove(&self, kind: CommandKind);
}

/// Upstream for routers that are fed directly through `dispatch`.
struct NoUpstream;

impl CommandUpstream for NoUpstream {
    fn install(&self, _kind: CommandKind) {}
    fn remove(&self, _kind: CommandKind) {}
}

/// A command together with the surface that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub origin: SurfaceId,
    pub command: Command,
}

type Callback = Arc<dyn Fn(&CommandEvent) + Send + Sync>;

struct Listener {
    id: u64,
    kind: CommandKind,
    scope: Option<SurfaceId>,
    callback: Callback,
}

#[derive(Default)]
struct RouterState {
    next_id: u64,
    listeners: Vec<Listener>,
    counts: HashMap<CommandKind, usize>,
}

struct RouterInner {
    state: Mutex<RouterState>,
    upstream: Arc<dyn CommandUpstream>,
}

impl RouterInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        let mut state = self.lock();
        let Some(pos) = state.listeners.iter().position(|l| l.id == id) else {
            return;
        };
        let listener = state.listeners.swap_remove(pos);
        let remaining = match state.counts.get_mut(&listener.kind) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.counts.remove(&listener.kind);
            self.upstream.remove(listener.kind);
            trace!(kind = %listener.kind, "upstream hook removed");
        }
    }
}

/// Cloneable handle to one shared router.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl EventRouter {
    pub fn new(upstream: Arc<dyn CommandUpstream>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                state: Mutex::new(RouterState::default()),
                upstream,
            }),
        }
    }

    /// A router with no transport behind it; commands arrive only via
    /// [`EventRouter::dispatch`].
    pub fn detached() -> Self {
        Self::new(Arc::new(NoUpstream))
    }

    /// Registers `callback` for commands of `kind`, optionally restricted to
    /// commands sent by `scope`.
    pub fn subscribe<F>(&self, kind: CommandKind, scope: Option<SurfaceId>, callback: F) -> Subscription
    where
        F: Fn(&CommandEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.listeners.push(Listener {
            id,
            kind,
            scope,
            callback: Arc::new(callback),
        });
        let count = state.counts.entry(kind).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.inner.upstream.install(kind);
            trace!(%kind, "upstream hook installed");
        }
        drop(state);

        Subscription {
            router: Arc::downgrade(&self.inner),
            id,
            kind,
            active: AtomicBool::new(true),
        }
    }

    /// Delivers a command to every matching listener.
    ///
    /// Callbacks run on the caller's thread, outside the router lock, so they
    /// may subscribe or unsubscribe freely.  Returns the number of listeners
    /// the command reached; zero is logged as a routing miss.
    pub fn dispatch(&self, origin: SurfaceId, command: Command) -> usize {
        let kind = command.kind();
        let targets: Vec<Callback> = self
            .inner
            .lock()
            .listeners
            .iter()
            .filter(|l| l.kind == kind && l.scope.map_or(true, |s| s == origin))
            .map(|l| Arc::clone(&l.callback))
            .collect();

        if targets.is_empty() {
            debug!(%kind, %origin, "routing miss: no listener for command, dropped");
            return 0;
        }

        let event = CommandEvent { origin, command };
        for callback in &targets {
            callback(&event);
        }
        targets.len()
    }

    /// Number of live listeners for `kind`.
    pub fn listener_count(&self, kind: CommandKind) -> usize {
        self.inner.lock().counts.get(&kind).copied().unwrap_or(0)
    }

    /// Total number of live listeners across all kinds.
    pub fn total_listeners(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Guard for one registered listener.
pub struct Subscription {
    router: Weak<RouterInner>,
    id: u64,
    kind: CommandKind,
    active: AtomicBool,
}

impl Subscription {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Removes the listener.  Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(router) = self.router.upgrade() {
            router.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
