//! Protocol-engine boundary.
//!
//! The protocol engine owns everything the orchestrator deliberately does not:
//! the cryptographic handshake, the wire protocol, screen capture, and video
//! encoding.  The orchestrator sees it only through [`ProtocolEngine`], an
//! instance-id based capability surface, and an [`EventSink`] through which
//! the engine reports every state change.
//!
//! # Why instance ids instead of objects? (for beginners)
//!
//! A native engine typically hands out raw pointers or integer handles.  We
//! keep that shape at the trait boundary ([`InstanceId`]) and put the type
//! safety one layer up, in [`handle`]: an [`Instance<Client, Signal>`] simply
//! has no `lease_request` method, so calling a host-only operation on a client
//! session does not compile.
//!
//! [`Instance<Client, Signal>`]: handle::Instance

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sv_core::{
    ButtonMask, ChannelKind, Display, EngineEvent, NativeThumbnail, PeerRole, TransportKind,
};
use thiserror::Error;

pub mod handle;
pub mod headless;
pub mod mock;

pub use handle::{ClientInstance, HostInstance, Instance};

/// Engine-assigned identity of one protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Engine-assigned identity of one thumbnail subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThumbnailStreamId(pub u64);

impl fmt::Display for ThumbnailStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thumbnails#{}", self.0)
    }
}

/// Receives every event an engine instance produces, in protocol order.
///
/// Implementations must not block; the engine calls this from its own
/// threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Callback invoked with each batch of capture-source thumbnails.
pub type ThumbnailCallback = Box<dyn FnMut(Vec<NativeThumbnail>) + Send>;

/// Error type for protocol-engine operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A transport channel could not be opened.
    #[error("failed to connect {channel:?} channel to {address}: {reason}")]
    ConnectFailed {
        channel: ChannelKind,
        address: String,
        reason: String,
    },

    /// The engine refused the operation.
    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The instance was already closed.
    #[error("{0} is closed")]
    InstanceClosed(InstanceId),

    /// This engine build cannot perform the operation at all.
    #[error("{0} is not supported by this engine")]
    Unsupported(&'static str),
}

/// The capability surface of a protocol engine.
///
/// Every method except [`ProtocolEngine::new_instance`] and the thumbnail
/// methods addresses one instance.  `close_instance` and `close_thumbnails`
/// are called at most once per id by the typed handles in [`handle`] and the
/// desktop-list coordinator respectively.
#[async_trait]
pub trait ProtocolEngine: Send + Sync + 'static {
    /// Creates an instance that reports its events to `sink`.
    fn new_instance(
        &self,
        role: PeerRole,
        transport: TransportKind,
        sink: Arc<dyn EventSink>,
    ) -> Result<InstanceId, EngineError>;

    async fn connect(
        &self,
        id: InstanceId,
        channel: ChannelKind,
        address: &str,
    ) -> Result<(), EngineError>;

    /// Binds a direct host's reliable and unreliable listeners.
    async fn start_server(
        &self,
        id: InstanceId,
        reliable: &str,
        unreliable: &str,
    ) -> Result<(), EngineError>;

    /// Asks the rendezvous service to join the host holding `lease_id`.
    async fn establish_session(&self, id: InstanceId, lease_id: &str) -> Result<(), EngineError>;

    async fn process_password(&self, id: InstanceId, password: &str) -> Result<(), EngineError>;

    async fn mouse_input(
        &self,
        id: InstanceId,
        x: i32,
        y: i32,
        button_mask: ButtonMask,
        button_mask_state: ButtonMask,
    ) -> Result<(), EngineError>;

    async fn keyboard_input(
        &self,
        id: InstanceId,
        key_code: u32,
        down: bool,
    ) -> Result<(), EngineError>;

    /// Replaces the set of displays shared with the connected client.
    async fn share_displays(
        &self,
        id: InstanceId,
        displays: &[Display],
        controllable: bool,
    ) -> Result<(), EngineError>;

    async fn lease_request(&self, id: InstanceId) -> Result<(), EngineError>;

    fn update_static_password(
        &self,
        id: InstanceId,
        password: Option<&str>,
    ) -> Result<(), EngineError>;

    fn close_instance(&self, id: InstanceId);

    /// Starts pushing capture-source thumbnail batches to `callback`.
    fn thumbnails(&self, callback: ThumbnailCallback) -> Result<ThumbnailStreamId, EngineError>;

    fn close_thumbnails(&self, stream: ThumbnailStreamId);

    fn available_displays(&self) -> Vec<Display>;
}
