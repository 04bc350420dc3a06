//! Mock protocol engine for unit and integration testing.
//!
//! Records every call, lets tests inject engine events into a specific
//! instance's sink, and drives thumbnail streams by hand.  No network or
//! capture work happens.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sv_core::{
    ButtonMask, ChannelKind, Display, EngineEvent, NativeThumbnail, PeerRole, TransportKind,
};

use super::{
    EngineError, EventSink, InstanceId, ProtocolEngine, ThumbnailCallback, ThumbnailStreamId,
};

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    NewInstance {
        id: InstanceId,
        role: PeerRole,
        transport: TransportKind,
    },
    Connect {
        id: InstanceId,
        channel: ChannelKind,
        address: String,
    },
    StartServer {
        id: InstanceId,
        reliable: String,
        unreliable: String,
    },
    EstablishSession {
        id: InstanceId,
        lease_id: String,
    },
    ProcessPassword {
        id: InstanceId,
        password: String,
    },
    MouseInput {
        id: InstanceId,
        x: i32,
        y: i32,
        button_mask: ButtonMask,
        button_mask_state: ButtonMask,
    },
    KeyboardInput {
        id: InstanceId,
        key_code: u32,
        down: bool,
    },
    ShareDisplays {
        id: InstanceId,
        displays: Vec<Display>,
        controllable: bool,
    },
    LeaseRequest {
        id: InstanceId,
    },
    UpdateStaticPassword {
        id: InstanceId,
        password: Option<String>,
    },
    CloseInstance {
        id: InstanceId,
    },
    Thumbnails {
        stream: ThumbnailStreamId,
    },
    CloseThumbnails {
        stream: ThumbnailStreamId,
    },
}

#[derive(Default)]
struct MockState {
    next_instance: u64,
    next_stream: u64,
    calls: Vec<EngineCall>,
    instances: Vec<(InstanceId, PeerRole, TransportKind)>,
    sinks: HashMap<InstanceId, Arc<dyn EventSink>>,
    connect_failure: Option<String>,
    establish_failure: Option<String>,
    start_server_failure: Option<String>,
    /// `None` while the callback is being invoked by `push_thumbnails`.
    streams: HashMap<ThumbnailStreamId, Option<ThumbnailCallback>>,
    displays: Vec<Display>,
}

/// A hand-driven [`ProtocolEngine`].
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Makes every subsequent `connect` fail with `reason`.
    pub fn fail_connect(&self, reason: &str) {
        self.lock().connect_failure = Some(reason.to_string());
    }

    /// Makes every subsequent `establish_session` fail with `reason`.
    pub fn fail_establish(&self, reason: &str) {
        self.lock().establish_failure = Some(reason.to_string());
    }

    /// Makes every subsequent `start_server` fail with `reason`.
    pub fn fail_start_server(&self, reason: &str) {
        self.lock().start_server_failure = Some(reason.to_string());
    }

    pub fn set_available_displays(&self, displays: Vec<Display>) {
        self.lock().displays = displays;
    }

    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Every instance ever created, in creation order.
    pub fn instances(&self) -> Vec<(InstanceId, PeerRole, TransportKind)> {
        self.lock().instances.clone()
    }

    /// Instances of the given role and transport, in creation order.
    pub fn instances_of(&self, role: PeerRole, transport: TransportKind) -> Vec<InstanceId> {
        self.lock()
            .instances
            .iter()
            .filter(|(_, r, t)| *r == role && *t == transport)
            .map(|(id, _, _)| *id)
            .collect()
    }

    /// Number of `close_instance` calls for `id`.
    pub fn close_count(&self, id: InstanceId) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::CloseInstance { id: closed } if *closed == id))
            .count()
    }

    /// Delivers `event` through the sink `id` was created with.
    ///
    /// Returns `false` if the instance is unknown.
    pub fn emit(&self, id: InstanceId, event: EngineEvent) -> bool {
        let sink = self.lock().sinks.get(&id).cloned();
        match sink {
            Some(sink) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }

    /// Most recently opened thumbnail stream.
    pub fn last_stream(&self) -> Option<ThumbnailStreamId> {
        self.lock()
            .calls
            .iter()
            .rev()
            .find_map(|c| match c {
                EngineCall::Thumbnails { stream } => Some(*stream),
                _ => None,
            })
    }

    pub fn open_stream_count(&self) -> usize {
        self.lock().streams.len()
    }

    pub fn thumbnail_close_count(&self, stream: ThumbnailStreamId) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::CloseThumbnails { stream: s } if *s == stream))
            .count()
    }

    /// Invokes the stream's callback with `batch`, as the capture thread would.
    ///
    /// The lock is released while the callback runs so the callback may close
    /// the stream itself.  Returns `false` if the stream is closed.
    pub fn push_thumbnails(&self, stream: ThumbnailStreamId, batch: Vec<NativeThumbnail>) -> bool {
        let callback = match self.lock().streams.get_mut(&stream) {
            Some(slot) => slot.take(),
            None => return false,
        };
        let Some(mut callback) = callback else {
            return false;
        };

        callback(batch);

        if let Some(slot) = self.lock().streams.get_mut(&stream) {
            *slot = Some(callback);
        }
        true
    }

    fn record(&self, call: EngineCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl ProtocolEngine for MockEngine {
    fn new_instance(
        &self,
        role: PeerRole,
        transport: TransportKind,
        sink: Arc<dyn EventSink>,
    ) -> Result<InstanceId, EngineError> {
        let mut state = self.lock();
        state.next_instance += 1;
        let id = InstanceId(state.next_instance);
        state.instances.push((id, role, transport));
        state.sinks.insert(id, sink);
        state.calls.push(EngineCall::NewInstance {
            id,
            role,
            transport,
        });
        Ok(id)
    }

    async fn connect(
        &self,
        id: InstanceId,
        channel: ChannelKind,
        address: &str,
    ) -> Result<(), EngineError> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(EngineCall::Connect {
                id,
                channel,
                address: address.to_string(),
            });
            state.connect_failure.clone()
        };
        match failure {
            Some(reason) => Err(EngineError::ConnectFailed {
                channel,
                address: address.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn start_server(
        &self,
        id: InstanceId,
        reliable: &str,
        unreliable: &str,
    ) -> Result<(), EngineError> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(EngineCall::StartServer {
                id,
                reliable: reliable.to_string(),
                unreliable: unreliable.to_string(),
            });
            state.start_server_failure.clone()
        };
        match failure {
            Some(reason) => Err(EngineError::Rejected {
                operation: "start_server",
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn establish_session(&self, id: InstanceId, lease_id: &str) -> Result<(), EngineError> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(EngineCall::EstablishSession {
                id,
                lease_id: lease_id.to_string(),
            });
            state.establish_failure.clone()
        };
        match failure {
            Some(reason) => Err(EngineError::Rejected {
                operation: "establish_session",
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn process_password(&self, id: InstanceId, password: &str) -> Result<(), EngineError> {
        self.record(EngineCall::ProcessPassword {
            id,
            password: password.to_string(),
        });
        Ok(())
    }

    async fn mouse_input(
        &self,
        id: InstanceId,
        x: i32,
        y: i32,
        button_mask: ButtonMask,
        button_mask_state: ButtonMask,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::MouseInput {
            id,
            x,
            y,
            button_mask,
            button_mask_state,
        });
        Ok(())
    }

    async fn keyboard_input(
        &self,
        id: InstanceId,
        key_code: u32,
        down: bool,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::KeyboardInput { id, key_code, down });
        Ok(())
    }

    async fn share_displays(
        &self,
        id: InstanceId,
        displays: &[Display],
        controllable: bool,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::ShareDisplays {
            id,
            displays: displays.to_vec(),
            controllable,
        });
        Ok(())
    }

    async fn lease_request(&self, id: InstanceId) -> Result<(), EngineError> {
        self.record(EngineCall::LeaseRequest { id });
        Ok(())
    }

    fn update_static_password(
        &self,
        id: InstanceId,
        password: Option<&str>,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::UpdateStaticPassword {
            id,
            password: password.map(str::to_string),
        });
        Ok(())
    }

    fn close_instance(&self, id: InstanceId) {
        let mut state = self.lock();
        state.sinks.remove(&id);
        state.calls.push(EngineCall::CloseInstance { id });
    }

    fn thumbnails(&self, callback: ThumbnailCallback) -> Result<ThumbnailStreamId, EngineError> {
        let mut state = self.lock();
        state.next_stream += 1;
        let stream = ThumbnailStreamId(state.next_stream);
        state.streams.insert(stream, Some(callback));
        state.calls.push(EngineCall::Thumbnails { stream });
        Ok(stream)
    }

    fn close_thumbnails(&self, stream: ThumbnailStreamId) {
        let mut state = self.lock();
        state.streams.remove(&stream);
        state.calls.push(EngineCall::CloseThumbnails { stream });
    }

    fn available_displays(&self) -> Vec<Display> {
        self.lock().displays.clone()
    }
}
