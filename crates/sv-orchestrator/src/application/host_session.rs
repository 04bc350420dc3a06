//! Host session manager.
//!
//! Serves this machine's displays over one transport.  The manager is an
//! actor (see the [`application`](crate::application) module docs) that owns
//! one [`HostInstance`], at most one host surface, and at most one
//! [`DesktopListStream`].
//!
//! # State machine
//!
//! ```text
//!             SessionUpdated             HostAuthenticated            UpdateDesktopList
//! Listening ──────────────► Authenticating ────────────────► Authenticated ──────────────► DisplaySharing
//!     ▲                       Peer          (opens surface)        │                            │
//!     └────────────────────────────── SessionEnded / HostDisconnect / surface closed ───────────┘
//!
//! any state ── destroy ──► Closed
//! ```
//!
//! A direct host binds both channels to `127.0.0.1:<port>` on start.  A signal
//! host connects to the rendezvous service and requests a lease; every
//! lease update is reported to the orchestrator as a [`HostNotice`].
//!
//! No surface exists until the first peer authenticates.  A second
//! authentication while a surface is open is ignored.

use std::fmt;
use std::sync::Arc;

use sv_core::{
    ChannelKind, Command, CommandKind, Config, EngineEvent, PageKind, SurfaceId, TransportKind,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::desktop_list::{CancelReason, DesktopListStream};
use super::SessionContext;
use crate::infrastructure::engine::handle::{Direct, Host, Signal};
use crate::infrastructure::engine::{EngineError, HostInstance, Instance};
use crate::infrastructure::event_bridge::{EngineEventStream, EventBridge};
use crate::infrastructure::event_router::{CommandEvent, Subscription};
use crate::infrastructure::ui_surface::{self, UiSurface};

/// Lifecycle state of a host session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Listening,
    AuthenticatingPeer,
    Authenticated,
    DisplaySharing,
    Closed,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for host startup.
#[derive(Debug, Error)]
pub enum HostSessionError {
    #[error("failed to create {transport} host instance: {source}")]
    Instance {
        transport: TransportKind,
        #[source]
        source: EngineError,
    },

    #[error("{transport} host failed to start: {source}")]
    Start {
        transport: TransportKind,
        #[source]
        source: EngineError,
    },
}

/// Messages a host reports to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNotice {
    /// The rendezvous service granted or renewed this host's lease.
    SessionId {
        transport: TransportKind,
        id: String,
    },
}

enum HostMessage {
    Command(CommandEvent),
    SurfaceClosed(SurfaceId),
    StaticPassword(Option<String>),
}

/// Handle to a running host session.
pub struct HostSession {
    transport: TransportKind,
    state: watch::Receiver<HostState>,
    surface: watch::Receiver<Option<SurfaceId>>,
    control: mpsc::UnboundedSender<HostMessage>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HostSession {
    /// Creates the engine instance, brings the transport up, and starts the
    /// session actor.
    ///
    /// # Errors
    ///
    /// [`HostSessionError`] if the instance cannot be created or the transport
    /// fails to come up.  The instance is closed before returning.
    pub async fn start(
        ctx: &SessionContext,
        transport: TransportKind,
        config: &Config,
        notices: mpsc::UnboundedSender<HostNotice>,
    ) -> Result<Self, HostSessionError> {
        let bridge = Arc::new(EventBridge::new());
        let events = bridge.subscribe();
        let instance_err = |source| HostSessionError::Instance { transport, source };
        let start_err = |source| HostSessionError::Start { transport, source };

        let instance = match transport {
            TransportKind::Direct => {
                let instance: Instance<Host, Direct> =
                    Instance::create(Arc::clone(&ctx.engine), bridge.clone()).map_err(instance_err)?;
                let address = config.direct_host_address();
                instance
                    .start_server(&address, &address)
                    .await
                    .map_err(start_err)?;
                info!(%address, "direct host listening");
                HostInstance::Direct(instance)
            }
            TransportKind::Signal => {
                let instance: Instance<Host, Signal> =
                    Instance::create(Arc::clone(&ctx.engine), bridge.clone()).map_err(instance_err)?;
                instance
                    .connect(ChannelKind::Reliable, &config.signal_server_reliable)
                    .await
                    .map_err(start_err)?;
                instance
                    .connect(ChannelKind::Unreliable, &config.signal_server_unreliable)
                    .await
                    .map_err(start_err)?;
                instance.lease_request().await.map_err(start_err)?;
                info!(relay = %config.signal_server_reliable, "signal host requested lease");
                HostInstance::Signal(instance)
            }
        };

        if let Some(password) = config.static_password.as_deref() {
            if let Err(e) = instance.update_static_password(Some(password)) {
                warn!(%transport, "failed to apply static password: {e}");
            }
        }

        let (state_tx, state_rx) = watch::channel(HostState::Listening);
        let (surface_tx, surface_rx) = watch::channel(None);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let actor = HostActor {
            transport,
            ctx: ctx.clone(),
            instance,
            events,
            inbox_tx: inbox_tx.clone(),
            inbox_rx,
            shutdown: shutdown.clone(),
            state: state_tx,
            surface_id: surface_tx,
            notices,
            ui: None,
            desktop_list: None,
        };
        let task = tokio::spawn(actor.run());

        Ok(Self {
            transport,
            state: state_rx,
            surface: surface_rx,
            control: inbox_tx,
            shutdown,
            task: Some(task),
        })
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<HostState> {
        self.state.clone()
    }

    /// The host surface, if a peer is currently authenticated.
    pub fn surface_id(&self) -> Option<SurfaceId> {
        *self.surface.borrow()
    }

    pub fn surface_watch(&self) -> watch::Receiver<Option<SurfaceId>> {
        self.surface.clone()
    }

    pub fn update_static_password(&self, password: Option<String>) {
        if self
            .control
            .send(HostMessage::StaticPassword(password))
            .is_err()
        {
            debug!(transport = %self.transport, "static password update for finished host dropped");
        }
    }

    /// Tears the session down and waits until it is gone.
    pub async fn destroy(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct HostUi {
    surface: Arc<dyn UiSurface>,
    _subscriptions: Vec<Subscription>,
    watcher: JoinHandle<()>,
}

struct HostActor {
    transport: TransportKind,
    ctx: SessionContext,
    instance: HostInstance,
    events: EngineEventStream,
    inbox_tx: mpsc::UnboundedSender<HostMessage>,
    inbox_rx: mpsc::UnboundedReceiver<HostMessage>,
    shutdown: CancellationToken,
    state: watch::Sender<HostState>,
    surface_id: watch::Sender<Option<SurfaceId>>,
    notices: mpsc::UnboundedSender<HostNotice>,
    ui: Option<HostUi>,
    desktop_list: Option<DesktopListStream>,
}

impl HostActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(message) = self.inbox_rx.recv() => self.handle_message(message).await,
                event = self.events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
        self.teardown();
    }

    fn set_state(&self, next: HostState) {
        let transport = self.transport;
        self.state.send_if_modified(|current| {
            if *current == next || *current == HostState::Closed {
                return false;
            }
            info!(%transport, from = %current, to = %next, "host state changed");
            *current = next;
            true
        });
    }

    fn current_state(&self) -> HostState {
        *self.state.borrow()
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LeaseUpdated { session_id } => {
                let notice = HostNotice::SessionId {
                    transport: self.transport,
                    id: session_id,
                };
                if self.notices.send(notice).is_err() {
                    debug!("orchestrator gone; lease update dropped");
                }
            }
            EngineEvent::SessionUpdated => {
                if self.current_state() == HostState::Listening {
                    self.set_state(HostState::AuthenticatingPeer);
                }
            }
            EngineEvent::HostAuthenticated => self.on_authenticated(),
            EngineEvent::HostHandshakeComplete => {
                debug!(transport = %self.transport, "host handshake complete");
            }
            EngineEvent::SessionEnded => {
                self.close_ui(CancelReason::SurfaceClosed);
                self.set_state(HostState::Listening);
            }
            EngineEvent::LeaseRequestRejected
            | EngineEvent::LeaseExtensionRejected
            | EngineEvent::VersionMismatch => {
                warn!(transport = %self.transport, kind = ?event.kind(), "rendezvous service refused host");
            }
            other => trace!(kind = ?other.kind(), "host ignores engine event"),
        }
    }

    fn on_authenticated(&mut self) {
        if self.ui.is_some() {
            debug!(transport = %self.transport, "duplicate peer authentication ignored");
            return;
        }

        let page = match self.transport {
            TransportKind::Signal => PageKind::SignalHost,
            TransportKind::Direct => PageKind::DirectHost,
        };
        let surface = match self.ctx.surfaces.open(page) {
            Ok(surface) => surface,
            Err(e) => {
                warn!(transport = %self.transport, "could not open host surface: {e}");
                return;
            }
        };
        let id = surface.id();

        let subscriptions = [
            CommandKind::HostUpdateDesktopList,
            CommandKind::HostGetDesktopList,
            CommandKind::HostDisconnect,
        ]
        .into_iter()
        .map(|kind| {
            let tx = self.inbox_tx.clone();
            self.ctx.router.subscribe(kind, Some(id), move |event| {
                let _ = tx.send(HostMessage::Command(event.clone()));
            })
        })
        .collect();

        let lifecycle = surface.lifecycle();
        let tx = self.inbox_tx.clone();
        let watcher = tokio::spawn(async move {
            ui_surface::closed(lifecycle).await;
            let _ = tx.send(HostMessage::SurfaceClosed(id));
        });

        self.ui = Some(HostUi {
            surface,
            _subscriptions: subscriptions,
            watcher,
        });
        self.surface_id.send_replace(Some(id));
        self.set_state(HostState::Authenticated);
        info!(transport = %self.transport, surface = %id, "peer authenticated; host surface opened");
    }

    async fn handle_message(&mut self, message: HostMessage) {
        match message {
            HostMessage::Command(event) => self.handle_command(event).await,
            HostMessage::SurfaceClosed(id) => {
                if self.ui.as_ref().map(|ui| ui.surface.id()) == Some(id) {
                    debug!(surface = %id, "host surface closed");
                    self.close_ui(CancelReason::SurfaceClosed);
                    self.set_state(HostState::Listening);
                }
            }
            HostMessage::StaticPassword(password) => {
                if let Err(e) = self.instance.update_static_password(password.as_deref()) {
                    warn!(transport = %self.transport, "failed to update static password: {e}");
                }
            }
        }
    }

    async fn handle_command(&mut self, event: CommandEvent) {
        let Some(surface) = self
            .ui
            .as_ref()
            .filter(|ui| ui.surface.id() == event.origin)
            .map(|ui| Arc::clone(&ui.surface))
        else {
            debug!(origin = %event.origin, kind = %event.command.kind(), "command for stale host surface dropped");
            return;
        };

        match event.command {
            Command::HostUpdateDesktopList {
                displays,
                controllable,
            } => match self.instance.share_displays(&displays, controllable).await {
                Ok(()) => {
                    info!(transport = %self.transport, count = displays.len(), controllable, "shared displays replaced");
                    self.set_state(HostState::DisplaySharing);
                }
                Err(e) => warn!(transport = %self.transport, "share_displays failed: {e}"),
            },
            Command::HostGetDesktopList => {
                if let Some(previous) = self.desktop_list.take() {
                    previous.cancel(CancelReason::Replaced);
                }
                match DesktopListStream::start(Arc::clone(&self.ctx.engine), &self.ctx.router, surface) {
                    Ok(list) => self.desktop_list = Some(list),
                    Err(e) => warn!(transport = %self.transport, "could not start desktop list: {e}"),
                }
            }
            Command::HostDisconnect => {
                info!(transport = %self.transport, "host surface requested disconnect");
                self.close_ui(CancelReason::SurfaceClosed);
                self.set_state(HostState::Listening);
            }
            other => trace!(kind = %other.kind(), "host ignores command"),
        }
    }

    fn close_ui(&mut self, reason: CancelReason) {
        if let Some(list) = self.desktop_list.take() {
            list.cancel(reason);
        }
        if let Some(ui) = self.ui.take() {
            ui.watcher.abort();
            ui.surface.close();
            self.surface_id.send_replace(None);
        }
    }

    fn teardown(&mut self) {
        self.close_ui(CancelReason::Dropped);
        self.instance.close();
        self.set_state(HostState::Closed);
        info!(transport = %self.transport, instance = %self.instance.id(), "host session closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::engine::mock::{EngineCall, MockEngine};
    use crate::infrastructure::event_router::EventRouter;
    use crate::infrastructure::ui_surface::mock::MockSurfaceFactory;
    use std::time::Duration;
    use sv_core::{Display, PeerRole};

    struct Fixture {
        engine: Arc<MockEngine>,
        surfaces: Arc<MockSurfaceFactory>,
        router: EventRouter,
        ctx: SessionContext,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(MockEngine::new());
        let surfaces = Arc::new(MockSurfaceFactory::new());
        let router = EventRouter::detached();
        let ctx = SessionContext::new(engine.clone(), router.clone(), surfaces.clone());
        Fixture {
            engine,
            surfaces,
            router,
            ctx,
        }
    }

    async fn wait_state(host: &HostSession, want: HostState) {
        let mut rx = host.state_watch();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == want))
            .await
            .expect("state not reached in time")
            .expect("host dropped");
    }

    async fn wait_surface(host: &HostSession) -> SurfaceId {
        let mut rx = host.surface_watch();
        let id = *tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.is_some()))
            .await
            .expect("surface not opened in time")
            .expect("host dropped");
        id.expect("checked above")
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    fn share_calls(engine: &MockEngine) -> Vec<(Vec<Display>, bool)> {
        engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::ShareDisplays {
                    displays,
                    controllable,
                    ..
                } => Some((displays, controllable)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_direct_host_binds_both_channels_to_configured_port() {
        // Arrange
        let f = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = Config {
            direct_host_port: "9051".to_string(),
            ..Config::default()
        };

        // Act
        let host = HostSession::start(&f.ctx, TransportKind::Direct, &config, tx)
            .await
            .unwrap();

        // Assert
        assert!(f.engine.calls().iter().any(|c| matches!(
            c,
            EngineCall::StartServer { reliable, unreliable, .. }
                if reliable == "127.0.0.1:9051" && unreliable == "127.0.0.1:9051"
        )));
        assert_eq!(host.state(), HostState::Listening);
        assert!(f.surfaces.surfaces().is_empty(), "no surface before authentication");
    }

    #[tokio::test]
    async fn test_signal_host_connects_relay_then_requests_lease() {
        let f = fixture();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = Config::default();

        let _host = HostSession::start(&f.ctx, TransportKind::Signal, &config, tx)
            .await
            .unwrap();
        let id = f.engine.instances_of(PeerRole::Host, TransportKind::Signal)[0];
        f.engine.emit(
            id,
            EngineEvent::LeaseUpdated {
                session_id: "123456789".to_string(),
            },
        );

        let calls = f.engine.calls();
        let kinds: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Connect { channel, address, .. } => Some(format!("{channel:?}@{address}")),
                EngineCall::LeaseRequest { .. } => Some("lease".to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["Reliable@example.com:69", "Unreliable@example.com:420", "lease"]
        );
        let notice = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            notice,
            HostNotice::SessionId {
                transport: TransportKind::Signal,
                id: "123456789".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_start_failure_closes_instance() {
        let f = fixture();
        f.engine.fail_start_server("address in use");
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = HostSession::start(&f.ctx, TransportKind::Direct, &Config::default(), tx).await;

        let err = result.err().expect("start must fail");
        assert!(err.to_string().contains("address in use"));
        let id = f.engine.instances()[0].0;
        assert_eq!(f.engine.close_count(id), 1);
    }

    #[tokio::test]
    async fn test_static_password_applied_on_start() {
        let f = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = Config {
            static_password: Some("hunter2".to_string()),
            ..Config::default()
        };

        let _host = HostSession::start(&f.ctx, TransportKind::Direct, &config, tx)
            .await
            .unwrap();

        assert!(f.engine.calls().iter().any(|c| matches!(
            c,
            EngineCall::UpdateStaticPassword { password: Some(p), .. } if p == "hunter2"
        )));
    }

    #[tokio::test]
    async fn test_duplicate_authentication_opens_one_surface() {
        // Arrange
        let f = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = HostSession::start(&f.ctx, TransportKind::Direct, &Config::default(), tx)
            .await
            .unwrap();
        let id = f.engine.instances()[0].0;

        // Act
        f.engine.emit(id, EngineEvent::HostAuthenticated);
        wait_surface(&host).await;
        f.engine.emit(id, EngineEvent::HostAuthenticated);
        f.engine.emit(id, EngineEvent::HostHandshakeComplete);
        tokio::task::yield_now().await;

        // Assert
        wait_state(&host, HostState::Authenticated).await;
        assert_eq!(f.surfaces.opened(PageKind::DirectHost).len(), 1);
    }

    #[tokio::test]
    async fn test_desktop_selection_replaces_shared_set() {
        // Arrange
        let f = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = HostSession::start(&f.ctx, TransportKind::Direct, &Config::default(), tx)
            .await
            .unwrap();
        let id = f.engine.instances()[0].0;
        f.engine.emit(id, EngineEvent::HostAuthenticated);
        let surface = wait_surface(&host).await;

        // Act
        f.router.dispatch(
            surface,
            Command::HostUpdateDesktopList {
                displays: vec![Display::monitor(0), Display::window(42)],
                controllable: true,
            },
        );
        f.router.dispatch(
            surface,
            Command::HostUpdateDesktopList {
                displays: vec![Display::monitor(1)],
                controllable: false,
            },
        );
        eventually(|| share_calls(&f.engine).len() == 2).await;

        // Assert
        assert_eq!(host.state(), HostState::DisplaySharing);
        assert_eq!(
            share_calls(&f.engine),
            vec![
                (vec![Display::monitor(0), Display::window(42)], true),
                (vec![Display::monitor(1)], false),
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_closes_surface_and_returns_to_listening() {
        // Arrange
        let f = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = HostSession::start(&f.ctx, TransportKind::Signal, &Config::default(), tx)
            .await
            .unwrap();
        let id = f.engine.instances()[0].0;
        f.engine.emit(id, EngineEvent::SessionUpdated);
        f.engine.emit(id, EngineEvent::HostAuthenticated);
        let surface_id = wait_surface(&host).await;

        // Act
        f.router.dispatch(surface_id, Command::HostDisconnect);
        wait_state(&host, HostState::Listening).await;

        // Assert
        let surface = f.surfaces.get(surface_id).unwrap();
        assert!(surface.is_closed());
        assert_eq!(host.surface_id(), None);
        assert_eq!(f.router.listener_count(CommandKind::HostDisconnect), 0);

        // A later authentication opens a fresh surface.
        f.engine.emit(id, EngineEvent::HostAuthenticated);
        let second = wait_surface(&host).await;
        assert_ne!(second, surface_id);
    }

    #[tokio::test]
    async fn test_destroy_closes_instance_and_surface_once() {
        // Arrange
        let f = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = HostSession::start(&f.ctx, TransportKind::Direct, &Config::default(), tx)
            .await
            .unwrap();
        let id = f.engine.instances()[0].0;
        f.engine.emit(id, EngineEvent::HostAuthenticated);
        let surface_id = wait_surface(&host).await;
        let state = host.state_watch();

        // Act
        host.destroy().await;

        // Assert
        assert_eq!(*state.borrow(), HostState::Closed);
        assert_eq!(f.engine.close_count(id), 1);
        assert_eq!(f.surfaces.get(surface_id).unwrap().close_calls(), 1);
        assert_eq!(f.router.total_listeners(), 0);
    }
}
