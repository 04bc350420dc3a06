//! Application orchestrator.
//!
//! Owns the current [`Config`], the two optional host sessions (one per
//! transport), the registry of client sessions, and the main surface.
//!
//! # Reconciliation
//!
//! Every configuration change runs [`Orchestrator::reconcile_hosts`]: for each
//! transport, a host is started if the flag is set and none is running, and
//! destroyed if the flag is cleared and one is running.  Host slots sit behind
//! one `tokio::sync::Mutex`, so two overlapping reconciliations cannot both
//! start a host for the same transport.
//!
//! # Client registry
//!
//! Client sessions are created on [`Command::EstablishSession`] and removed by
//! their own `on_closed` callback once they reach `Closed`.  The registry lock
//! is never held across an `.await`.
//!
//! [`Command::EstablishSession`]: sv_core::Command::EstablishSession

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use sv_core::{format_session_id, Command, CommandKind, Config, Notification, SurfaceId, TransportKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client_session::{ClientSession, ClientSessionError, ClientSessionId, RelayAddresses};
use super::host_session::{HostNotice, HostSession, HostState};
use super::main_window::MainWindow;
use super::SessionContext;
use crate::infrastructure::event_router::{CommandEvent, EventRouter, Subscription};
use crate::infrastructure::storage::config::ConfigStore;

type ClientRegistry = Arc<Mutex<HashMap<ClientSessionId, ClientSession>>>;

#[derive(Default)]
struct HostSlots {
    direct: Option<HostSession>,
    signal: Option<HostSession>,
}

impl HostSlots {
    fn slot(&mut self, transport: TransportKind) -> &mut Option<HostSession> {
        match transport {
            TransportKind::Direct => &mut self.direct,
            TransportKind::Signal => &mut self.signal,
        }
    }

    fn get(&self, transport: TransportKind) -> Option<&HostSession> {
        match transport {
            TransportKind::Direct => self.direct.as_ref(),
            TransportKind::Signal => self.signal.as_ref(),
        }
    }
}

struct Inner {
    ctx: SessionContext,
    store: Arc<dyn ConfigStore>,
    config: watch::Sender<Config>,
    hosts: tokio::sync::Mutex<HostSlots>,
    clients: ClientRegistry,
    main_window: MainWindow,
    notices: mpsc::UnboundedSender<HostNotice>,
    subscriptions: Mutex<Vec<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// The top-level owner of every session manager.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Builds the orchestrator and starts listening for its UI commands.
    ///
    /// The configuration is loaded from `store`.  No host is started until
    /// [`init`](Self::init).  Must be called from within a Tokio runtime.
    pub fn new(ctx: SessionContext, store: Arc<dyn ConfigStore>) -> Self {
        let config = store.load();
        let (config_tx, _) = watch::channel(config);
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let subscriptions = [
            CommandKind::EstablishSession,
            CommandKind::ConfigRequest,
            CommandKind::ConfigUpdate,
        ]
        .into_iter()
        .map(|kind| {
            let tx = commands_tx.clone();
            ctx.router.subscribe(kind, None, move |event| {
                let _ = tx.send(event.clone());
            })
        })
        .collect();

        let inner = Arc::new(Inner {
            main_window: MainWindow::new(
                Arc::clone(&ctx.surfaces),
                ctx.router.clone(),
                ctx.ready_timeout,
            ),
            ctx,
            store,
            config: config_tx,
            hosts: tokio::sync::Mutex::new(HostSlots::default()),
            clients: Arc::new(Mutex::new(HashMap::new())),
            notices: notices_tx,
            subscriptions: Mutex::new(subscriptions),
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });

        let tasks = vec![
            tokio::spawn(command_pump(Arc::downgrade(&inner), commands_rx)),
            tokio::spawn(notice_pump(Arc::downgrade(&inner), notices_rx)),
        ];
        *lock(&inner.tasks) = tasks;

        Self { inner }
    }

    /// Shows the main surface and starts the configured hosts.
    pub async fn init(&self) {
        if let Err(e) = self.inner.main_window.focus() {
            error!("failed to open main surface: {e}");
        }
        self.inner.reconcile_hosts().await;
    }

    pub fn config(&self) -> Config {
        self.inner.config.borrow().clone()
    }

    pub fn config_watch(&self) -> watch::Receiver<Config> {
        self.inner.config.subscribe()
    }

    /// Publishes `config`, persists it, and reconciles hosts.
    pub async fn update_config(&self, config: Config) {
        self.inner.update_config(config).await;
    }

    /// Starts or destroys hosts so they match the current configuration.
    ///
    /// Returns the transports for which a host was started.
    pub async fn reconcile_hosts(&self) -> Vec<TransportKind> {
        self.inner.reconcile_hosts().await
    }

    /// Starts a client session towards `identifier`.
    ///
    /// # Errors
    ///
    /// [`ClientSessionError`] if the session could not be created.
    pub fn establish_session(&self, identifier: &str) -> Result<ClientSessionId, ClientSessionError> {
        self.inner.establish_session(identifier)
    }

    pub fn client_count(&self) -> usize {
        lock(&self.inner.clients).len()
    }

    pub fn client_ids(&self) -> Vec<ClientSessionId> {
        lock(&self.inner.clients).keys().copied().collect()
    }

    /// Surface of a registered client session.
    pub fn client_surface(&self, id: ClientSessionId) -> Option<SurfaceId> {
        lock(&self.inner.clients).get(&id).map(ClientSession::surface_id)
    }

    pub async fn has_host(&self, transport: TransportKind) -> bool {
        self.inner.hosts.lock().await.get(transport).is_some()
    }

    pub async fn host_state(&self, transport: TransportKind) -> Option<HostState> {
        self.inner.hosts.lock().await.get(transport).map(HostSession::state)
    }

    pub async fn host_surface(&self, transport: TransportKind) -> Option<SurfaceId> {
        self.inner
            .hosts
            .lock()
            .await
            .get(transport)
            .and_then(HostSession::surface_id)
    }

    pub fn main_window(&self) -> &MainWindow {
        &self.inner.main_window
    }

    pub fn router(&self) -> &EventRouter {
        &self.inner.ctx.router
    }

    /// Tears down every session and the main surface.  Only the first call
    /// does anything.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

impl Inner {
    async fn update_config(&self, config: Config) {
        let previous = self.config.send_replace(config.clone());
        if let Err(e) = self.store.save(&config) {
            warn!("failed to persist config: {e}");
        }

        let started = self.reconcile_hosts().await;

        if previous.static_password != config.static_password {
            let hosts = self.hosts.lock().await;
            for transport in [TransportKind::Direct, TransportKind::Signal] {
                if started.contains(&transport) {
                    continue;
                }
                if let Some(host) = hosts.get(transport) {
                    host.update_static_password(config.static_password.clone());
                }
            }
        }
    }

    async fn reconcile_hosts(&self) -> Vec<TransportKind> {
        let mut started = Vec::new();
        if self.shutdown.is_cancelled() {
            return started;
        }

        let config = self.config.borrow().clone();
        let mut hosts = self.hosts.lock().await;
        for transport in [TransportKind::Signal, TransportKind::Direct] {
            let wanted = config.hosts_over(transport);
            let slot = hosts.slot(transport);
            match (wanted, slot.is_some()) {
                (true, false) => {
                    match HostSession::start(&self.ctx, transport, &config, self.notices.clone()).await {
                        Ok(host) => {
                            info!(%transport, "host started");
                            *slot = Some(host);
                            started.push(transport);
                        }
                        Err(e) => error!("{e}"),
                    }
                }
                (false, true) => {
                    if let Some(host) = slot.take() {
                        info!(%transport, state = %host.state(), "stopping host");
                        host.destroy().await;
                    }
                }
                _ => {}
            }
        }
        started
    }

    fn establish_session(&self, identifier: &str) -> Result<ClientSessionId, ClientSessionError> {
        let relay = RelayAddresses::from(&*self.config.borrow());
        let registry = Arc::downgrade(&self.clients);

        let mut clients = lock(&self.clients);
        let session = ClientSession::spawn(&self.ctx, relay, identifier, move |id| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let removed = lock(&registry).remove(&id);
            if removed.is_some() {
                debug!(session = %id, "client session unregistered");
            }
        })?;
        let id = session.id();
        clients.insert(id, session);
        info!(session = %id, total = clients.len(), "client session registered");
        Ok(id)
    }

    fn reply_config(&self, origin: SurfaceId) {
        let Some(surface) = self.ctx.surfaces.find(origin) else {
            debug!(%origin, "config request from vanished surface dropped");
            return;
        };
        let config = self.config.borrow().clone();
        if let Err(e) = surface.send(Notification::Config { config }) {
            debug!("config reply not delivered: {e}");
        }
    }

    async fn handle_command(&self, event: CommandEvent) {
        match event.command {
            Command::EstablishSession { id } => {
                if let Err(e) = self.establish_session(&id) {
                    error!(origin = %event.origin, "{e}");
                }
            }
            Command::ConfigRequest => self.reply_config(event.origin),
            Command::ConfigUpdate { config } => self.update_config(config).await,
            other => debug!(kind = %other.kind(), "orchestrator ignores command"),
        }
    }

    async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        info!("orchestrator shutting down");

        lock(&self.subscriptions).clear();

        let (direct, signal) = {
            let mut hosts = self.hosts.lock().await;
            (hosts.direct.take(), hosts.signal.take())
        };
        for host in [direct, signal].into_iter().flatten() {
            host.destroy().await;
        }

        let clients: Vec<ClientSession> = lock(&self.clients).drain().map(|(_, s)| s).collect();
        for client in clients {
            client.destroy().await;
        }

        self.main_window.close();

        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        info!("orchestrator stopped");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn command_pump(inner: Weak<Inner>, mut commands: mpsc::UnboundedReceiver<CommandEvent>) {
    while let Some(event) = commands.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.shutdown.is_cancelled() {
            break;
        }
        inner.handle_command(event).await;
    }
}

async fn notice_pump(inner: Weak<Inner>, mut notices: mpsc::UnboundedReceiver<HostNotice>) {
    while let Some(notice) = notices.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match notice {
            HostNotice::SessionId { transport, id } => {
                let formatted = format_session_id(&id);
                info!(%transport, session_id = %formatted, "session id updated");
                inner.main_window.show_session_id(formatted);
            }
        }
    }
}
