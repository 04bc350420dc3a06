//! Engine used by the binary when no native protocol engine is linked.
//!
//! Instances can be created and closed, so every manager can run through its
//! lifecycle, but anything that needs the network or screen capture fails:
//! `connect` with [`EngineError::ConnectFailed`], everything else with
//! [`EngineError::Unsupported`].  A client session therefore ends in
//! `Error` with a "connection failed" notification, and hosts fail to start
//! (which the orchestrator logs).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sv_core::{ButtonMask, ChannelKind, Display, PeerRole, TransportKind};
use tracing::{debug, info};

use super::{
    EngineError, EventSink, InstanceId, ProtocolEngine, ThumbnailCallback, ThumbnailStreamId,
};

const NO_ENGINE: &str = "no protocol engine is linked into this build";

/// A [`ProtocolEngine`] without transport or capture.
#[derive(Default)]
pub struct HeadlessEngine {
    next_id: AtomicU64,
    instances: Mutex<HashMap<InstanceId, (PeerRole, TransportKind)>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances created and not yet closed.
    pub fn live_instances(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn check(&self, id: InstanceId) -> Result<(), EngineError> {
        if self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
        {
            Ok(())
        } else {
            Err(EngineError::InstanceClosed(id))
        }
    }
}

#[async_trait]
impl ProtocolEngine for HeadlessEngine {
    fn new_instance(
        &self,
        role: PeerRole,
        transport: TransportKind,
        _sink: Arc<dyn EventSink>,
    ) -> Result<InstanceId, EngineError> {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (role, transport));
        info!(%id, ?role, %transport, "headless instance created");
        Ok(id)
    }

    async fn connect(
        &self,
        id: InstanceId,
        channel: ChannelKind,
        address: &str,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        Err(EngineError::ConnectFailed {
            channel,
            address: address.to_string(),
            reason: NO_ENGINE.to_string(),
        })
    }

    async fn start_server(
        &self,
        id: InstanceId,
        _reliable: &str,
        _unreliable: &str,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        Err(EngineError::Unsupported("start_server"))
    }

    async fn establish_session(&self, id: InstanceId, _lease_id: &str) -> Result<(), EngineError> {
        self.check(id)?;
        Err(EngineError::Unsupported("establish_session"))
    }

    async fn process_password(&self, id: InstanceId, _password: &str) -> Result<(), EngineError> {
        self.check(id)?;
        debug!(%id, "password dropped");
        Ok(())
    }

    async fn mouse_input(
        &self,
        id: InstanceId,
        x: i32,
        y: i32,
        _button_mask: ButtonMask,
        _button_mask_state: ButtonMask,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        debug!(%id, x, y, "mouse input dropped");
        Ok(())
    }

    async fn keyboard_input(
        &self,
        id: InstanceId,
        key_code: u32,
        down: bool,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        debug!(%id, key_code, down, "keyboard input dropped");
        Ok(())
    }

    async fn share_displays(
        &self,
        id: InstanceId,
        displays: &[Display],
        controllable: bool,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        debug!(%id, count = displays.len(), controllable, "display share dropped");
        Ok(())
    }

    async fn lease_request(&self, id: InstanceId) -> Result<(), EngineError> {
        self.check(id)?;
        Err(EngineError::Unsupported("lease_request"))
    }

    fn update_static_password(
        &self,
        id: InstanceId,
        password: Option<&str>,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        debug!(%id, set = password.is_some(), "static password recorded");
        Ok(())
    }

    fn close_instance(&self, id: InstanceId) {
        if self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
        {
            info!(%id, "headless instance closed");
        }
    }

    fn thumbnails(&self, _callback: ThumbnailCallback) -> Result<ThumbnailStreamId, EngineError> {
        Err(EngineError::Unsupported("thumbnails"))
    }

    fn close_thumbnails(&self, stream: ThumbnailStreamId) {
        debug!(%stream, "no thumbnail stream to close");
    }

    fn available_displays(&self) -> Vec<Display> {
        Vec::new()
    }
}
