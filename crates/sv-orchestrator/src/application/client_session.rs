//! Client session manager.
//!
//! One outgoing remote-desktop connection: one [`ClientInstance`], one client
//! surface, one actor task.
//!
//! # State machine
//!
//! ```text
//! Connecting ──► (PasswordPrompt) ──► Authenticating ──► HandshakeComplete ──► Streaming
//!     │                                    │
//!     └──────────────► Error ◄─────────────┘
//!
//! any state ── surface closed / shutdown ──► Closed
//! ```
//!
//! # Readiness gate
//!
//! The surface is opened and the transport connect starts at the same time.
//! Nothing may reach the surface before it announces readiness, so every
//! outgoing notification goes through a [`ReadyGate`] that buffers until the
//! [`ReadySignal`] resolves.  A connect failure that happens first is therefore
//! still delivered, just later.  If readiness never comes the session is
//! closed.
//!
//! # Forwarding
//!
//! Only events for which [`EngineEventKind::is_forwarded_to_client`] holds are
//! relayed to the surface.  Everything else only drives the state machine.
//!
//! [`EngineEventKind::is_forwarded_to_client`]: sv_core::EngineEventKind::is_forwarded_to_client

use std::fmt;
use std::sync::Arc;

use sv_core::{
    ChannelKind, Command, CommandKind, Config, EngineEvent, Notification, PageKind, PeerTarget,
    SurfaceId, TransportKind,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::SessionContext;
use crate::infrastructure::engine::{ClientInstance, EngineError};
use crate::infrastructure::event_bridge::{EngineEventStream, EventBridge};
use crate::infrastructure::event_router::{CommandEvent, Subscription};
use crate::infrastructure::ui_surface::{self, ReadySignal, SurfaceError, UiSurface};

/// Lifecycle state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    PasswordPrompt,
    Authenticating,
    HandshakeComplete,
    Streaming,
    Error,
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Registry key of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientSessionId(Uuid);

impl ClientSessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Error type for client startup.
#[derive(Debug, Error)]
pub enum ClientSessionError {
    #[error("failed to create client instance: {0}")]
    Instance(#[source] EngineError),

    #[error("failed to open client surface: {0}")]
    Surface(#[source] SurfaceError),
}

/// Relay addresses a signal client connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAddresses {
    pub reliable: String,
    pub unreliable: String,
}

impl From<&Config> for RelayAddresses {
    fn from(config: &Config) -> Self {
        Self {
            reliable: config.signal_server_reliable.clone(),
            unreliable: config.signal_server_unreliable.clone(),
        }
    }
}

enum ClientMessage {
    Command(CommandEvent),
    SurfaceClosed,
}

type OnClosed = Box<dyn FnOnce(ClientSessionId) + Send>;

/// Handle to a running client session.
pub struct ClientSession {
    id: ClientSessionId,
    target: PeerTarget,
    surface_id: SurfaceId,
    state: watch::Receiver<ClientState>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ClientSession {
    /// Classifies `identifier`, creates the engine instance and the client
    /// surface, and starts connecting.
    ///
    /// `on_closed` runs exactly once, from the session task, after the session
    /// reached [`ClientState::Closed`].
    ///
    /// # Errors
    ///
    /// [`ClientSessionError`] if the instance or the surface cannot be
    /// created.  Nothing is left running in that case.
    pub fn spawn<F>(
        ctx: &SessionContext,
        relay: RelayAddresses,
        identifier: &str,
        on_closed: F,
    ) -> Result<Self, ClientSessionError>
    where
        F: FnOnce(ClientSessionId) + Send + 'static,
    {
        let id = ClientSessionId::new();
        let target = PeerTarget::classify(identifier);
        let transport = target.transport();

        let bridge = Arc::new(EventBridge::new());
        let events = bridge.subscribe();
        let instance = ClientInstance::create(Arc::clone(&ctx.engine), transport, bridge)
            .map_err(ClientSessionError::Instance)?;
        let surface = ctx
            .surfaces
            .open(PageKind::Client)
            .map_err(ClientSessionError::Surface)?;
        let surface_id = surface.id();

        let ready = ReadySignal::listen(&ctx.router, surface_id, ctx.ready_timeout);

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let subscriptions = [
            CommandKind::ClientPasswordInput,
            CommandKind::ClientMouseInput,
            CommandKind::ClientKeyboardInput,
        ]
        .into_iter()
        .map(|kind| {
            let tx = inbox_tx.clone();
            ctx.router.subscribe(kind, Some(surface_id), move |event| {
                let _ = tx.send(ClientMessage::Command(event.clone()));
            })
        })
        .collect();

        let lifecycle = surface.lifecycle();
        let watcher = tokio::spawn(async move {
            ui_surface::closed(lifecycle).await;
            let _ = inbox_tx.send(ClientMessage::SurfaceClosed);
        });

        let (state_tx, state_rx) = watch::channel(ClientState::Connecting);
        let shutdown = CancellationToken::new();
        info!(session = %id, %transport, peer = target.as_str(), surface = %surface_id, "client session connecting");

        let actor = ClientActor {
            id,
            instance: Arc::new(instance),
            target: target.clone(),
            relay,
            surface,
            events,
            inbox: inbox_rx,
            shutdown: shutdown.clone(),
            state: state_tx,
            gate: ReadyGate::default(),
            subscriptions,
            watcher,
            on_closed: Some(Box::new(on_closed)),
        };
        let task = tokio::spawn(actor.run(ready));

        Ok(Self {
            id,
            target,
            surface_id,
            state: state_rx,
            shutdown,
            task: Some(task),
        })
    }

    pub fn id(&self) -> ClientSessionId {
        self.id
    }

    pub fn target(&self) -> &PeerTarget {
        &self.target
    }

    pub fn transport(&self) -> TransportKind {
        self.target.transport()
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    /// Asks the session to tear down.  Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once the session reached [`ClientState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ClientState::Closed).await;
    }

    /// Tears the session down and waits until it is gone.
    pub async fn destroy(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Ready gate ────────────────────────────────────────────────────────────────

/// Holds notifications back until the surface announced readiness.
#[derive(Debug, Default)]
struct ReadyGate {
    open: bool,
    pending: Vec<Notification>,
}

impl ReadyGate {
    fn push(&mut self, surface: &dyn UiSurface, notification: Notification) {
        if self.open {
            Self::deliver(surface, notification);
        } else {
            self.pending.push(notification);
        }
    }

    fn open(&mut self, surface: &dyn UiSurface) {
        self.open = true;
        for notification in self.pending.drain(..) {
            Self::deliver(surface, notification);
        }
    }

    fn deliver(surface: &dyn UiSurface, notification: Notification) {
        if let Err(e) = surface.send(notification) {
            debug!("client notification dropped: {e}");
        }
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct ClientActor {
    id: ClientSessionId,
    instance: Arc<ClientInstance>,
    target: PeerTarget,
    relay: RelayAddresses,
    surface: Arc<dyn UiSurface>,
    events: EngineEventStream,
    inbox: mpsc::UnboundedReceiver<ClientMessage>,
    shutdown: CancellationToken,
    state: watch::Sender<ClientState>,
    gate: ReadyGate,
    subscriptions: Vec<Subscription>,
    watcher: JoinHandle<()>,
    on_closed: Option<OnClosed>,
}

impl ClientActor {
    async fn run(mut self, ready: ReadySignal) {
        let ready = ready.wait();
        tokio::pin!(ready);
        let mut awaiting_ready = true;

        let connect = connect_transport(
            Arc::clone(&self.instance),
            self.target.clone(),
            self.relay.clone(),
        );
        tokio::pin!(connect);
        let mut connecting = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = self.inbox.recv() => match message {
                    Some(ClientMessage::Command(event)) => self.handle_command(event).await,
                    Some(ClientMessage::SurfaceClosed) | None => {
                        debug!(session = %self.id, "client surface closed");
                        break;
                    }
                },
                result = &mut ready, if awaiting_ready => {
                    awaiting_ready = false;
                    match result {
                        Ok(()) => self.gate.open(self.surface.as_ref()),
                        Err(e) => {
                            warn!(session = %self.id, "client surface never became ready: {e}");
                            break;
                        }
                    }
                }
                result = &mut connect, if connecting => {
                    connecting = false;
                    match result {
                        Ok(()) => debug!(session = %self.id, "client transport connected"),
                        Err(e) => self.fail(e.to_string()),
                    }
                }
                event = self.events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        self.teardown();
    }

    fn current_state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Moves to `next` unless the session already failed or closed.
    fn advance(&self, next: ClientState) {
        let session = self.id;
        self.state.send_if_modified(|current| {
            if *current == next || matches!(*current, ClientState::Error | ClientState::Closed) {
                return false;
            }
            info!(%session, from = %current, to = %next, "client state changed");
            *current = next;
            true
        });
    }

    /// Reports a transport failure once and parks the session in `Error`.
    fn fail(&mut self, reason: String) {
        if matches!(self.current_state(), ClientState::Error | ClientState::Closed) {
            debug!(session = %self.id, %reason, "further failure ignored");
            return;
        }
        warn!(session = %self.id, peer = self.target.as_str(), %reason, "client connection failed");
        self.gate
            .push(self.surface.as_ref(), Notification::ConnectionFailed { reason });
        self.advance(ClientState::Error);
    }

    fn handle_event(&mut self, event: EngineEvent) {
        let kind = event.kind();
        match &event {
            EngineEvent::SessionRequestRejected { status } => {
                self.fail(format!("session request rejected: {status}"));
                return;
            }
            EngineEvent::PasswordPrompt => self.advance(ClientState::PasswordPrompt),
            EngineEvent::ClientAuthenticated => {
                if matches!(
                    self.current_state(),
                    ClientState::Connecting | ClientState::PasswordPrompt
                ) {
                    self.advance(ClientState::Authenticating);
                }
            }
            EngineEvent::ClientAuthenticationFailed => {
                if self.current_state() != ClientState::Closed {
                    self.advance(ClientState::Error);
                }
            }
            EngineEvent::ClientHandshakeComplete => self.advance(ClientState::HandshakeComplete),
            EngineEvent::DisplayShared { .. }
            | EngineEvent::DisplayUnshared { .. }
            | EngineEvent::FrameData { .. }
            | EngineEvent::DisplayUpdate { .. } => self.advance(ClientState::Streaming),
            _ => {}
        }

        if kind.is_forwarded_to_client() {
            self.gate
                .push(self.surface.as_ref(), Notification::EngineEvent { event });
        } else {
            trace!(session = %self.id, ?kind, "engine event not forwarded");
        }
    }

    async fn handle_command(&mut self, event: CommandEvent) {
        let result = match event.command {
            Command::ClientPasswordInput { password } => {
                if self.current_state() == ClientState::PasswordPrompt {
                    self.advance(ClientState::Authenticating);
                }
                self.instance.process_password(&password).await
            }
            Command::ClientMouseInput {
                x,
                y,
                button_mask,
                button_mask_state,
            } => {
                self.instance
                    .mouse_input(x, y, button_mask, button_mask_state)
                    .await
            }
            Command::ClientKeyboardInput { key_code, down } => {
                self.instance.keyboard_input(key_code, down).await
            }
            other => {
                trace!(kind = %other.kind(), "client ignores command");
                Ok(())
            }
        };
        if let Err(e) = result {
            debug!(session = %self.id, "client input not delivered: {e}");
        }
    }

    fn teardown(&mut self) {
        self.state.send_replace(ClientState::Closed);
        self.subscriptions.clear();
        self.watcher.abort();
        self.instance.close();
        self.surface.close();
        info!(session = %self.id, "client session closed");
        if let Some(on_closed) = self.on_closed.take() {
            on_closed(self.id);
        }
    }
}

/// Brings up both channels; for a lease id, also asks the rendezvous service
/// to join the host.
async fn connect_transport(
    instance: Arc<ClientInstance>,
    target: PeerTarget,
    relay: RelayAddresses,
) -> Result<(), EngineError> {
    match (instance.as_ref(), &target) {
        (ClientInstance::Direct(direct), PeerTarget::Direct(address)) => {
            direct.connect(ChannelKind::Reliable, address).await?;
            direct.connect(ChannelKind::Unreliable, address).await
        }
        (ClientInstance::Signal(signal), PeerTarget::Lease(lease)) => {
            signal.connect(ChannelKind::Reliable, &relay.reliable).await?;
            signal
                .connect(ChannelKind::Unreliable, &relay.unreliable)
                .await?;
            signal.establish_session(lease).await
        }
        _ => Err(EngineError::Unsupported("mismatched client transport")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
