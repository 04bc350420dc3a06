//! Domain value objects for ScreenView.
//!
//! Everything in this module is immutable data: descriptors handed to the
//! protocol engine, the classification of a user-typed peer identifier, and
//! the persisted configuration.  None of it performs I/O.

/// Configuration value object (single source of truth for host behaviour).
pub mod config;

/// Display descriptors and capture-source thumbnails.
pub mod display;

/// Peer identifier classification and session-id formatting.
pub mod peer_id;
