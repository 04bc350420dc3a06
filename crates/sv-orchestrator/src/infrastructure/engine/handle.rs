//! Typed capability handles.
//!
//! An [`Instance<R, T>`] owns one engine instance of role `R` ([`Host`] or
//! [`Client`]) over transport `T` ([`Direct`] or [`Signal`]).  Operations are
//! defined only on the combinations that support them:
//!
//! ```text
//!                      Client/Direct  Client/Signal  Host/Direct  Host/Signal
//! connect                    ✓              ✓             ✓            ✓
//! establish_session                         ✓
//! process_password / input   ✓              ✓
//! start_server                                            ✓
//! lease_request                                                        ✓
//! share_displays / password                               ✓            ✓
//! ```
//!
//! Closing is idempotent: the first [`Instance::close`] (or the drop of the
//! handle) calls `close_instance` on the engine; every later call is a no-op
//! and every later operation fails with [`EngineError::InstanceClosed`].
//!
//! [`ClientInstance`] and [`HostInstance`] are the sum types managers hold when
//! the transport is only known at run time.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sv_core::{ButtonMask, ChannelKind, Display, PeerRole, TransportKind};

use super::{EngineError, EventSink, InstanceId, ProtocolEngine};

mod sealed {
    pub trait Sealed {}
}

/// Peer-role marker.
pub trait Role: sealed::Sealed + Send + Sync + 'static {
    const ROLE: PeerRole;
}

/// Transport marker.
pub trait Transport: sealed::Sealed + Send + Sync + 'static {
    const KIND: TransportKind;
}

#[derive(Debug)]
pub enum Host {}
#[derive(Debug)]
pub enum Client {}
#[derive(Debug)]
pub enum Direct {}
#[derive(Debug)]
pub enum Signal {}

impl sealed::Sealed for Host {}
impl sealed::Sealed for Client {}
impl sealed::Sealed for Direct {}
impl sealed::Sealed for Signal {}

impl Role for Host {
    const ROLE: PeerRole = PeerRole::Host;
}
impl Role for Client {
    const ROLE: PeerRole = PeerRole::Client;
}
impl Transport for Direct {
    const KIND: TransportKind = TransportKind::Direct;
}
impl Transport for Signal {
    const KIND: TransportKind = TransportKind::Signal;
}

/// Exclusive owner of one engine instance.
pub struct Instance<R: Role, T: Transport> {
    engine: Arc<dyn ProtocolEngine>,
    id: InstanceId,
    closed: AtomicBool,
    _marker: PhantomData<fn() -> (R, T)>,
}

impl<R: Role, T: Transport> std::fmt::Debug for Instance<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("role", &R::ROLE)
            .field("transport", &T::KIND)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<R: Role, T: Transport> Instance<R, T> {
    /// Asks the engine for a new instance reporting to `sink`.
    ///
    /// # Errors
    ///
    /// Propagates the engine's refusal to create the instance.
    pub fn create(
        engine: Arc<dyn ProtocolEngine>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        let id = engine.new_instance(R::ROLE, T::KIND, sink)?;
        Ok(Self {
            engine,
            id,
            closed: AtomicBool::new(false),
            _marker: PhantomData,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Destroys the engine instance.  Returns `true` only for the call that
    /// actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.engine.close_instance(self.id);
        true
    }

    fn live_id(&self) -> Result<InstanceId, EngineError> {
        if self.is_closed() {
            Err(EngineError::InstanceClosed(self.id))
        } else {
            Ok(self.id)
        }
    }

    pub async fn connect(&self, channel: ChannelKind, address: &str) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.connect(id, channel, address).await
    }
}

impl<R: Role, T: Transport> Drop for Instance<R, T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> Instance<Client, T> {
    pub async fn process_password(&self, password: &str) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.process_password(id, password).await
    }

    pub async fn mouse_input(
        &self,
        x: i32,
        y: i32,
        button_mask: ButtonMask,
        button_mask_state: ButtonMask,
    ) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine
            .mouse_input(id, x, y, button_mask, button_mask_state)
            .await
    }

    pub async fn keyboard_input(&self, key_code: u32, down: bool) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.keyboard_input(id, key_code, down).await
    }
}

impl Instance<Client, Signal> {
    pub async fn establish_session(&self, lease_id: &str) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.establish_session(id, lease_id).await
    }
}

impl Instance<Host, Direct> {
    pub async fn start_server(&self, reliable: &str, unreliable: &str) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.start_server(id, reliable, unreliable).await
    }
}

impl Instance<Host, Signal> {
    pub async fn lease_request(&self) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.lease_request(id).await
    }
}

impl<T: Transport> Instance<Host, T> {
    pub async fn share_displays(
        &self,
        displays: &[Display],
        controllable: bool,
    ) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.share_displays(id, displays, controllable).await
    }

    pub fn update_static_password(&self, password: Option<&str>) -> Result<(), EngineError> {
        let id = self.live_id()?;
        self.engine.update_static_password(id, password)
    }
}

// ── Run-time transport selection ──────────────────────────────────────────────

/// A client instance whose transport was chosen from the peer identifier.
#[derive(Debug)]
pub enum ClientInstance {
    Direct(Instance<Client, Direct>),
    Signal(Instance<Client, Signal>),
}

impl ClientInstance {
    pub fn create(
        engine: Arc<dyn ProtocolEngine>,
        transport: TransportKind,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        Ok(match transport {
            TransportKind::Direct => Self::Direct(Instance::create(engine, sink)?),
            TransportKind::Signal => Self::Signal(Instance::create(engine, sink)?),
        })
    }

    pub fn id(&self) -> InstanceId {
        match self {
            Self::Direct(i) => i.id(),
            Self::Signal(i) => i.id(),
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Self::Direct(_) => TransportKind::Direct,
            Self::Signal(_) => TransportKind::Signal,
        }
    }

    pub fn close(&self) -> bool {
        match self {
            Self::Direct(i) => i.close(),
            Self::Signal(i) => i.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Direct(i) => i.is_closed(),
            Self::Signal(i) => i.is_closed(),
        }
    }

    pub async fn process_password(&self, password: &str) -> Result<(), EngineError> {
        match self {
            Self::Direct(i) => i.process_password(password).await,
            Self::Signal(i) => i.process_password(password).await,
        }
    }

    pub async fn mouse_input(
        &self,
        x: i32,
        y: i32,
        button_mask: ButtonMask,
        button_mask_state: ButtonMask,
    ) -> Result<(), EngineError> {
        match self {
            Self::Direct(i) => i.mouse_input(x, y, button_mask, button_mask_state).await,
            Self::Signal(i) => i.mouse_input(x, y, button_mask, button_mask_state).await,
        }
    }

    pub async fn keyboard_input(&self, key_code: u32, down: bool) -> Result<(), EngineError> {
        match self {
            Self::Direct(i) => i.keyboard_input(key_code, down).await,
            Self::Signal(i) => i.keyboard_input(key_code, down).await,
        }
    }
}

/// A host instance of either transport.
#[derive(Debug)]
pub enum HostInstance {
    Direct(Instance<Host, Direct>),
    Signal(Instance<Host, Signal>),
}

impl HostInstance {
    pub fn id(&self) -> InstanceId {
        match self {
            Self::Direct(i) => i.id(),
            Self::Signal(i) => i.id(),
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Self::Direct(_) => TransportKind::Direct,
            Self::Signal(_) => TransportKind::Signal,
        }
    }

    pub fn close(&self) -> bool {
        match self {
            Self::Direct(i) => i.close(),
            Self::Signal(i) => i.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Direct(i) => i.is_closed(),
            Self::Signal(i) => i.is_closed(),
        }
    }

    pub async fn share_displays(
        &self,
        displays: &[Display],
        controllable: bool,
    ) -> Result<(), EngineError> {
        match self {
            Self::Direct(i) => i.share_displays(displays, controllable).await,
            Self::Signal(i) => i.share_displays(displays, controllable).await,
        }
    }

    pub fn update_static_password(&self, password: Option<&str>) -> Result<(), EngineError> {
        match self {
            Self::Direct(i) => i.update_static_password(password),
            Self::Signal(i) => i.update_static_password(password),
        }
    }
}
