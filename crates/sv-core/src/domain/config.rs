//! The configuration value object.
//!
//! [`Config`] is the single source of truth for whether this machine serves
//! as a host, and how.  It is plain data: the orchestrator publishes a new
//! value on every change instead of mutating a shared one, and collaborators
//! receive copies.
//!
//! Every field has a serde default so that a config file written by an older
//! version (or a partially hand-edited one) still loads.

use serde::{Deserialize, Serialize};

use crate::engine::TransportKind;

/// Persisted application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listen for direct (point-to-point) connections on `direct_host_port`.
    #[serde(default)]
    pub start_as_direct_host: bool,
    /// Port the direct host binds both its reliable and unreliable channel to.
    #[serde(default = "default_direct_host_port")]
    pub direct_host_port: String,
    /// Register with the rendezvous service and wait for a client.
    #[serde(default)]
    pub start_as_signal_host: bool,
    /// Rendezvous service address for the reliable channel.
    #[serde(default = "default_signal_server_reliable")]
    pub signal_server_reliable: String,
    /// Rendezvous service address for the unreliable channel.
    #[serde(default = "default_signal_server_unreliable")]
    pub signal_server_unreliable: String,
    /// Static password accepted by hosts in addition to one-time passwords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_password: Option<String>,
    /// Whether the macOS screen-capture permission prompt was already shown.
    #[serde(default)]
    pub prompted_for_permission_macos: bool,
    /// Account service used by the main surface's sign-in page.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_direct_host_port() -> String {
    "9051".to_string()
}
fn default_signal_server_reliable() -> String {
    "example.com:69".to_string()
}
fn default_signal_server_unreliable() -> String {
    "example.com:420".to_string()
}
fn default_auth_url() -> String {
    "https://example.com".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_as_direct_host: false,
            direct_host_port: default_direct_host_port(),
            start_as_signal_host: false,
            signal_server_reliable: default_signal_server_reliable(),
            signal_server_unreliable: default_signal_server_unreliable(),
            static_password: None,
            prompted_for_permission_macos: false,
            auth_url: default_auth_url(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Address both direct-host channels bind to.
    pub fn direct_host_address(&self) -> String {
        format!("127.0.0.1:{}", self.direct_host_port)
    }

    /// Whether a host over `transport` should be running.
    pub fn hosts_over(&self, transport: TransportKind) -> bool {
        match transport {
            TransportKind::Direct => self.start_as_direct_host,
            TransportKind::Signal => self.start_as_signal_host,
        }
    }
}
