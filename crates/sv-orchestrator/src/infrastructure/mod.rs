//! Infrastructure layer for the orchestrator.
//!
//! Contains the adapters at the edges of the system: the protocol-engine
//! boundary, the event bridge and router that carry engine events and UI
//! commands, the UI-surface abstraction, and configuration storage.
//!
//! **Dependency rule**: the `application` layer talks to these adapters only
//! through the traits they export ([`engine::ProtocolEngine`],
//! [`ui_surface::UiSurface`], [`ui_surface::SurfaceFactory`],
//! [`storage::config::ConfigStore`]), so tests can swap in the `mock`
//! implementations and the binary can run on the `headless` ones.

pub mod engine;
pub mod event_bridge;
pub mod event_router;
pub mod storage;
pub mod ui_surface;
