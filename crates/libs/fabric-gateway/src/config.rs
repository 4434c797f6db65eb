use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Gateway process configuration. `fabricd` loads this from TOML; kept
/// as a plain `Deserialize` struct so any format serde supports works.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub self_id: String,
    pub agency: String,
    pub listen_ip: IpAddr,
    pub listen_port: u16,
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_allowed_msg_size: usize,
    #[serde(default = "default_reconnect_period_secs")]
    pub reconnect_period_secs: u64,
    #[serde(default = "default_unreachable_distance")]
    pub unreachable_distance: u8,
    #[serde(default = "default_router_sync_period_secs")]
    pub router_sync_period_secs: u64,
    #[serde(default = "default_node_info_sync_period_secs")]
    pub node_info_sync_period_secs: u64,
    #[serde(default = "default_health_check_period_secs")]
    pub health_check_period_secs: u64,
    #[serde(default = "default_holding_ttl_secs")]
    pub holding_ttl_secs: u64,
    pub peer_endpoints_file: String,
    /// Read but not wired up: TLS material handling is out of scope.
    #[serde(default)]
    pub tls_cert_path: Option<String>,
}

fn default_thread_pool_size() -> usize {
    4
}

fn default_max_frame_size() -> usize {
    fabric_wire::DEFAULT_MAX_FRAME_SIZE
}

fn default_reconnect_period_secs() -> u64 {
    10
}

fn default_unreachable_distance() -> u8 {
    fabric_routing::DEFAULT_UNREACHABLE_DISTANCE
}

fn default_router_sync_period_secs() -> u64 {
    3
}

fn default_node_info_sync_period_secs() -> u64 {
    3
}

fn default_health_check_period_secs() -> u64 {
    30
}

fn default_holding_ttl_secs() -> u64 {
    fabric_router::DEFAULT_HOLDING_TTL.as_secs()
}

impl GatewayConfig {
    pub fn reconnect_period(&self) -> Duration {
        Duration::from_secs(self.reconnect_period_secs)
    }

    pub fn router_sync_period(&self) -> Duration {
        Duration::from_secs(self.router_sync_period_secs)
    }

    pub fn node_info_sync_period(&self) -> Duration {
        Duration::from_secs(self.node_info_sync_period_secs)
    }

    pub fn health_check_period(&self) -> Duration {
        Duration::from_secs(self.health_check_period_secs)
    }

    pub fn holding_ttl(&self) -> Duration {
        Duration::from_secs(self.holding_ttl_secs)
    }
}

/// `{"nodes": ["host:port", ...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct PeerEndpoints {
    pub nodes: Vec<String>,
}

impl PeerEndpoints {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Read(path.display().to_string(), err))?;
        serde_json::from_str(&text).map_err(|err| ConfigError::PeerList(path.display().to_string(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_endpoints_parses_nodes_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.json");
        std::fs::write(&path, r#"{"nodes": ["127.0.0.1:9001", "127.0.0.1:9002"]}"#).unwrap();
        let endpoints = PeerEndpoints::from_path(&path).unwrap();
        assert_eq!(endpoints.nodes, vec!["127.0.0.1:9001", "127.0.0.1:9002"]);
    }

    #[test]
    fn peer_endpoints_reports_missing_file() {
        let err = PeerEndpoints::from_path("/nonexistent/peers.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read(_, _)));
    }
}
