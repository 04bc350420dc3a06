//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the [`sv_core::Config`] value
//! object as TOML in the platform-appropriate directory, and exposes the
//! [`config::ConfigStore`] trait the orchestrator persists through.
//!
//! Loading never fails from the orchestrator's point of view: a missing or
//! corrupt file yields the defaults, so a bad edit cannot stop the app from
//! starting.

pub mod config;
