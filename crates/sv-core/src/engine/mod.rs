//! Protocol-engine vocabulary shared by the orchestrator and its tests.
//!
//! The protocol engine performs the handshake, transport, and video work.  It
//! reports state changes through exactly one channel: a stream of
//! [`EngineEvent`]s.  This module defines that tagged union together with the
//! small tags (role, transport, channel) that parameterise an engine session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::display::{DisplayInformation, DisplayShare};

/// Which side of a remote-desktop session an engine instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    Host,
    Client,
}

/// How two peers reach each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Point-to-point connection to a known address.
    Direct,
    /// Relayed through the rendezvous ("signal") service using a lease id.
    Signal,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Signal => f.write_str("signal"),
        }
    }
}

/// One of the two channels every engine session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Ordered, acknowledged channel (control, authentication).
    Reliable,
    /// Datagram channel (frames, pointer motion).
    Unreliable,
}

/// Pointer button bit set, as forwarded from the client surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonMask(pub u8);

impl ButtonMask {
    pub const LEFT: Self = Self(1 << 0);
    pub const MIDDLE: Self = Self(1 << 1);
    pub const RIGHT: Self = Self(1 << 2);
    pub const SCROLL_UP: Self = Self(1 << 3);
    pub const SCROLL_DOWN: Self = Self(1 << 4);
    pub const SCROLL_LEFT: Self = Self(1 << 5);
    pub const SCROLL_RIGHT: Self = Self(1 << 6);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ButtonMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Reason the rendezvous service refused to establish a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishSessionStatus {
    Success,
    IdNotFound,
    PeerOffline,
    PeerBusy,
    SelfBusy,
    OtherError,
}

impl fmt::Display for EstablishSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "session established",
            Self::IdNotFound => "no host is registered under that id",
            Self::PeerOffline => "the host is offline",
            Self::PeerBusy => "the host is busy with another session",
            Self::SelfBusy => "this machine is already in a session",
            Self::OtherError => "the rendezvous service reported an error",
        };
        f.write_str(text)
    }
}

// ── Engine events ─────────────────────────────────────────────────────────────

/// Everything the protocol engine can report about one session.
///
/// The engine emits these in protocol order; the orchestrator never
/// synthesises them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The rendezvous service speaks an incompatible protocol version.
    VersionMismatch,
    /// A lease was granted or renewed; `session_id` is shown to the user.
    LeaseUpdated { session_id: String },
    /// A peer rendezvoused with this host's lease.
    SessionUpdated,
    /// The rendezvous session ended.
    SessionEnded,
    LeaseRequestRejected,
    SessionRequestRejected { status: EstablishSessionStatus },
    LeaseExtensionRejected,
    /// The host requires a password before authenticating this client.
    PasswordPrompt,
    ClientAuthenticated,
    ClientAuthenticationFailed,
    /// An incoming peer authenticated against this host.
    HostAuthenticated,
    ClientHandshakeComplete,
    HostHandshakeComplete,
    DisplayShared { share: DisplayShare },
    DisplayUnshared { display_id: u8 },
    FrameData { display_id: u8, data: Vec<u8> },
    DisplayUpdate {
        clipboard_readable: bool,
        displays: Vec<DisplayInformation>,
    },
}

/// Payload-free discriminant of [`EngineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    VersionMismatch,
    LeaseUpdated,
    SessionUpdated,
    SessionEnded,
    LeaseRequestRejected,
    SessionRequestRejected,
    LeaseExtensionRejected,
    PasswordPrompt,
    ClientAuthenticated,
    ClientAuthenticationFailed,
    HostAuthenticated,
    ClientHandshakeComplete,
    HostHandshakeComplete,
    DisplayShared,
    DisplayUnshared,
    FrameData,
    DisplayUpdate,
}

impl EngineEvent {
    pub fn kind(&self) -> EngineEventKind {
        match self {
            Self::VersionMismatch => EngineEventKind::VersionMismatch,
            Self::LeaseUpdated { .. } => EngineEventKind::LeaseUpdated,
            Self::SessionUpdated => EngineEventKind::SessionUpdated,
            Self::SessionEnded => EngineEventKind::SessionEnded,
            Self::LeaseRequestRejected => EngineEventKind::LeaseRequestRejected,
            Self::SessionRequestRejected { .. } => EngineEventKind::SessionRequestRejected,
            Self::LeaseExtensionRejected => EngineEventKind::LeaseExtensionRejected,
            Self::PasswordPrompt => EngineEventKind::PasswordPrompt,
            Self::ClientAuthenticated => EngineEventKind::ClientAuthenticated,
            Self::ClientAuthenticationFailed => EngineEventKind::ClientAuthenticationFailed,
            Self::HostAuthenticated => EngineEventKind::HostAuthenticated,
            Self::ClientHandshakeComplete => EngineEventKind::ClientHandshakeComplete,
            Self::HostHandshakeComplete => EngineEventKind::HostHandshakeComplete,
            Self::DisplayShared { .. } => EngineEventKind::DisplayShared,
            Self::DisplayUnshared { .. } => EngineEventKind::DisplayUnshared,
            Self::FrameData { .. } => EngineEventKind::FrameData,
            Self::DisplayUpdate { .. } => EngineEventKind::DisplayUpdate,
        }
    }
}

impl EngineEventKind {
    /// Events a client session relays to its UI surface.
    ///
    /// Everything else is consumed (or ignored) by the session manager.
    pub fn is_forwarded_to_client(self) -> bool {
        matches!(
            self,
            Self::ClientAuthenticated
                | Self::ClientAuthenticationFailed
                | Self::ClientHandshakeComplete
                | Self::DisplayShared
                | Self::DisplayUnshared
                | Self::FrameData
                | Self::DisplayUpdate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_allow_list_covers_auth_handshake_and_video() {
        for kind in [
            EngineEventKind::ClientAuthenticated,
            EngineEventKind::ClientAuthenticationFailed,
            EngineEventKind::ClientHandshakeComplete,
            EngineEventKind::DisplayShared,
            EngineEventKind::DisplayUnshared,
            EngineEventKind::FrameData,
        ] {
            assert!(kind.is_forwarded_to_client(), "{kind:?} must be forwarded");
        }
    }

    #[test]
    fn test_client_allow_list_excludes_rendezvous_and_host_events() {
        for kind in [
            EngineEventKind::LeaseUpdated,
            EngineEventKind::SessionEnded,
            EngineEventKind::VersionMismatch,
            EngineEventKind::HostAuthenticated,
            EngineEventKind::PasswordPrompt,
        ] {
            assert!(!kind.is_forwarded_to_client(), "{kind:?} must not be forwarded");
        }
    }

    #[test]
    fn test_event_kind_matches_variant() {
        let event = EngineEvent::FrameData {
            display_id: 2,
            data: vec![0; 4],
        };
        assert_eq!(event.kind(), EngineEventKind::FrameData);
    }

    #[test]
    fn test_event_json_uses_event_tag() {
        let json = serde_json::to_string(&EngineEvent::LeaseUpdated {
            session_id: "123456789".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"lease_updated","session_id":"123456789"}"#);
    }

    #[test]
    fn test_button_mask_combines_bits() {
        let mask = ButtonMask::LEFT | ButtonMask::RIGHT;
        assert!(mask.contains(ButtonMask::LEFT));
        assert!(!mask.contains(ButtonMask::MIDDLE));
    }
}
