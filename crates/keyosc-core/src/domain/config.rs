//! Bridge configuration types.
//!
//! [`BridgeConfig`] is an immutable value: a change never edits a config in
//! place, it produces a new value via [`ConfigUpdate::apply`] which the
//! orchestrator then adopts wholesale.
//!
//! Serde defaults let a partial TOML file (or none at all) produce a working
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling intervals below this are raised to it.
pub const MIN_POLLING_INTERVAL_MS: u64 = 10;

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use keyosc_core::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.local_port, 8111);
/// assert_eq!(cfg.remote_port, 8222);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// UDP port the inbound OSC listener binds to.
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    /// Interface address for the listener.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Hostname or IP of the control surface receiving status messages.
    #[serde(default = "default_remote_host")]
    pub remote_host: String,
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    /// Status polling period while a slideshow is playing.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    /// Directory listed by `/list` when no path argument is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<PathBuf>,
    /// Address prefix for outbound messages, optional on inbound ones.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_local_port() -> u16 {
    8111
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}
fn default_remote_port() -> u16 {
    8222
}
fn default_polling_interval_ms() -> u64 {
    300
}
fn default_namespace() -> String {
    "/keyosc".to_string()
}

impl Default for BridgeConfig {
    /// | Field               | Default       |
    /// |---------------------|---------------|
    /// | local_port          | `8111`        |
    /// | bind_address        | `0.0.0.0`     |
    /// | remote_host         | `127.0.0.1`   |
    /// | remote_port         | `8222`        |
    /// | polling_interval_ms | `300`         |
    /// | content_path        | none          |
    /// | namespace           | `/keyosc`     |
    fn default() -> Self {
        Self {
            local_port: default_local_port(),
            bind_address: default_bind_address(),
            remote_host: default_remote_host(),
            remote_port: default_remote_port(),
            polling_interval_ms: default_polling_interval_ms(),
            content_path: None,
            namespace: default_namespace(),
        }
    }
}

impl BridgeConfig {
    /// The polling period, never shorter than [`MIN_POLLING_INTERVAL_MS`].
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.max(MIN_POLLING_INTERVAL_MS))
    }

    /// `"<bind_address>:<local_port>"`, ready for `UdpSocket::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.local_port)
    }

    /// `"<remote_host>:<remote_port>"`, ready for `lookup_host`.
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }

    /// The namespace with any trailing `/` removed.
    pub fn namespace_prefix(&self) -> &str {
        self.namespace.trim_end_matches('/')
    }
}

/// A partial configuration change.  Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub local_port: Option<u16>,
    pub bind_address: Option<String>,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
    pub polling_interval_ms: Option<u64>,
    pub content_path: Option<PathBuf>,
    pub namespace: Option<String>,
}

impl ConfigUpdate {
    /// An update that only changes the content directory.
    pub fn content_path(path: impl Into<PathBuf>) -> Self {
        Self {
            content_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Produces a new configuration with this update merged into `base`.
    pub fn apply(&self, base: &BridgeConfig) -> BridgeConfig {
        BridgeConfig {
            local_port: self.local_port.unwrap_or(base.local_port),
            bind_address: self
                .bind_address
                .clone()
                .unwrap_or_else(|| base.bind_address.clone()),
            remote_host: self
                .remote_host
                .clone()
                .unwrap_or_else(|| base.remote_host.clone()),
            remote_port: self.remote_port.unwrap_or(base.remote_port),
            polling_interval_ms: self
                .polling_interval_ms
                .unwrap_or(base.polling_interval_ms),
            content_path: self
                .content_path
                .clone()
                .or_else(|| base.content_path.clone()),
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| base.namespace.clone()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports_match_companion_preset() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.local_port, 8111);
        assert_eq!(cfg.remote_port, 8222);
        assert_eq!(cfg.remote_host, "127.0.0.1");
    }

    #[test]
    fn test_default_polling_interval_is_300ms() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.polling_interval(), Duration::from_millis(300));
    }

    #[test]
    fn test_polling_interval_is_clamped() {
        // A zero period would make a timer spin.
        let cfg = BridgeConfig {
            polling_interval_ms: 0,
            ..BridgeConfig::default()
        };
        assert_eq!(
            cfg.polling_interval(),
            Duration::from_millis(MIN_POLLING_INTERVAL_MS)
        );
    }

    #[test]
    fn test_listen_and_remote_addr_formatting() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8111");
        assert_eq!(cfg.remote_addr(), "127.0.0.1:8222");
    }

    #[test]
    fn test_namespace_prefix_strips_trailing_slash() {
        let cfg = BridgeConfig {
            namespace: "/show/".to_string(),
            ..BridgeConfig::default()
        };
        assert_eq!(cfg.namespace_prefix(), "/show");
    }

    #[test]
    fn test_apply_produces_new_value_and_keeps_base() {
        // Arrange
        let base = BridgeConfig::default();
        let update = ConfigUpdate {
            local_port: Some(9000),
            remote_host: Some("10.0.0.5".to_string()),
            ..ConfigUpdate::default()
        };

        // Act
        let next = update.apply(&base);

        // Assert
        assert_eq!(next.local_port, 9000);
        assert_eq!(next.remote_host, "10.0.0.5");
        assert_eq!(next.remote_port, 8222, "untouched fields are kept");
        assert_eq!(base.local_port, 8111, "base config is not mutated");
    }

    #[test]
    fn test_content_path_update_only_touches_content_path() {
        let base = BridgeConfig::default();
        let next = ConfigUpdate::content_path("/Users/show/Decks").apply(&base);
        assert_eq!(next.content_path, Some(PathBuf::from("/Users/show/Decks")));
        assert_eq!(next.local_port, base.local_port);
    }

    #[test]
    fn test_empty_update_is_identity() {
        let base = BridgeConfig::default();
        assert_eq!(ConfigUpdate::default().apply(&base), base);
    }
}
