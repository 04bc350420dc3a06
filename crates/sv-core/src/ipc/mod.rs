//! Messages exchanged between the orchestrator and its UI surfaces.
//!
//! # Two closed sets
//!
//! ```text
//!   UI surface ──── Command ─────► orchestrator / session manager
//!   UI surface ◄── Notification ── orchestrator / session manager
//! ```
//!
//! Every command carries no origin of its own; the transport that delivers it
//! stamps the [`SurfaceId`] of the sending surface, which the event router
//! uses to scope delivery.
//!
//! Both enums are internally tagged with `"type"` so a webview transport can
//! carry them as JSON without an extra envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::config::Config;
use crate::domain::display::{Display, NativeThumbnail};
use crate::engine::{ButtonMask, EngineEvent};

/// Stable identity of one UI surface (window) for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Which page a UI surface is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Connect box, host toggles, session-id display.
    Main,
    /// Remote desktop viewer for one client session.
    Client,
    /// Control bar shown while a relayed peer is connected to this host.
    SignalHost,
    /// Control bar shown while a direct peer is connected to this host.
    DirectHost,
}

// ── Commands (UI → orchestrator) ──────────────────────────────────────────────

/// Everything a UI surface can ask of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Connect to a peer by lease id or direct address.
    EstablishSession { id: String },
    ConfigRequest,
    ConfigUpdate { config: Config },
    /// Start pushing capture-source thumbnails to the sending surface.
    HostGetDesktopList,
    HostStopDesktopList,
    /// Replace the shared display set.
    HostUpdateDesktopList {
        displays: Vec<Display>,
        controllable: bool,
    },
    HostDisconnect,
    ClientPasswordInput { password: String },
    ClientMouseInput {
        x: i32,
        y: i32,
        button_mask: ButtonMask,
        button_mask_state: ButtonMask,
    },
    ClientKeyboardInput { key_code: u32, down: bool },
    /// The surface finished loading and can receive notifications.
    RendererReady,
}

/// Payload-free discriminant of [`Command`]; the event router's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    EstablishSession,
    ConfigRequest,
    ConfigUpdate,
    HostGetDesktopList,
    HostStopDesktopList,
    HostUpdateDesktopList,
    HostDisconnect,
    ClientPasswordInput,
    ClientMouseInput,
    ClientKeyboardInput,
    RendererReady,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::EstablishSession { .. } => CommandKind::EstablishSession,
            Self::ConfigRequest => CommandKind::ConfigRequest,
            Self::ConfigUpdate { .. } => CommandKind::ConfigUpdate,
            Self::HostGetDesktopList => CommandKind::HostGetDesktopList,
            Self::HostStopDesktopList => CommandKind::HostStopDesktopList,
            Self::HostUpdateDesktopList { .. } => CommandKind::HostUpdateDesktopList,
            Self::HostDisconnect => CommandKind::HostDisconnect,
            Self::ClientPasswordInput { .. } => CommandKind::ClientPasswordInput,
            Self::ClientMouseInput { .. } => CommandKind::ClientMouseInput,
            Self::ClientKeyboardInput { .. } => CommandKind::ClientKeyboardInput,
            Self::RendererReady => CommandKind::RendererReady,
        }
    }
}

impl CommandKind {
    /// Every command kind, in declaration order.
    pub const ALL: [CommandKind; 11] = [
        Self::EstablishSession,
        Self::ConfigRequest,
        Self::ConfigUpdate,
        Self::HostGetDesktopList,
        Self::HostStopDesktopList,
        Self::HostUpdateDesktopList,
        Self::HostDisconnect,
        Self::ClientPasswordInput,
        Self::ClientMouseInput,
        Self::ClientKeyboardInput,
        Self::RendererReady,
    ];

    /// Channel name used by the surface transport.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EstablishSession => "establish_session",
            Self::ConfigRequest => "config_request",
            Self::ConfigUpdate => "config_update",
            Self::HostGetDesktopList => "host_get_desktop_list",
            Self::HostStopDesktopList => "host_stop_desktop_list",
            Self::HostUpdateDesktopList => "host_update_desktop_list",
            Self::HostDisconnect => "host_disconnect",
            Self::ClientPasswordInput => "client_password_input",
            Self::ClientMouseInput => "client_mouse_input",
            Self::ClientKeyboardInput => "client_keyboard_input",
            Self::RendererReady => "renderer_ready",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Notifications (orchestrator → UI) ─────────────────────────────────────────

/// Everything the orchestrator can push to a UI surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Formatted lease id of this machine's signal host.
    SessionId { id: String },
    DesktopList { thumbnails: Vec<NativeThumbnail> },
    Config { config: Config },
    /// The client session could not be established.
    ConnectionFailed { reason: String },
    /// A protocol event forwarded verbatim.
    EngineEvent { event: EngineEvent },
}
