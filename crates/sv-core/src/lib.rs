//! # sv-core
//!
//! Shared library for ScreenView containing the domain value objects, the
//! protocol-engine event taxonomy, and the message sets exchanged between the
//! orchestrator and its UI surfaces.
//!
//! This crate has zero dependencies on OS APIs, UI frameworks, async runtimes,
//! or network sockets.  Everything here is plain data that can be constructed
//! and inspected in a unit test.
//!
//! # Architecture overview
//!
//! ScreenView lets one machine (the *host*) share its displays with another
//! machine (the *client*).  Peers reach each other either *directly*
//! (`10.0.0.5:9051`) or through a rendezvous service using a numeric
//! *lease id* (`123 456 789`).  The cryptographic handshake, wire protocol,
//! and video pipeline all live inside an opaque protocol engine; the
//! orchestrator crate only drives its lifecycle.
//!
//! - **`domain`** – Display descriptors, peer identifier classification, and
//!   the [`Config`] value object.
//!
//! - **`engine`** – Role/transport tags and [`EngineEvent`], the tagged union
//!   of everything the protocol engine can report.
//!
//! - **`ipc`** – [`Command`] (UI → orchestrator) and [`Notification`]
//!   (orchestrator → UI), plus the [`SurfaceId`] used to scope them.

pub mod domain;
pub mod engine;
pub mod ipc;

pub use domain::config::Config;
pub use domain::display::{Display, DisplayInformation, DisplayShare, DisplayType, NativeThumbnail};
pub use domain::peer_id::{format_session_id, PeerTarget};
pub use engine::{
    ButtonMask, ChannelKind, EngineEvent, EngineEventKind, EstablishSessionStatus, PeerRole,
    TransportKind,
};
pub use ipc::{Command, CommandKind, Notification, PageKind, SurfaceId};
