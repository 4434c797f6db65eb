use std::time::Duration;

use serde::Deserialize;

/// Front process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontConfig {
    pub node_id: String,
    pub agency: String,
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,
    pub self_endpoint: String,
    /// PRO-mode gRPC target; read but unused while running in AIR mode.
    #[serde(default)]
    pub gateway_grpc_target: Option<String>,
    #[serde(default = "default_keep_alive_period_ms")]
    pub keep_alive_period_ms: u64,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default = "default_health_check_period_ms")]
    pub health_check_period_ms: u64,
}

fn default_thread_pool_size() -> usize {
    4
}

fn default_keep_alive_period_ms() -> u64 {
    30_000
}

fn default_health_check_period_ms() -> u64 {
    30_000
}

impl FrontConfig {
    pub fn keep_alive_period(&self) -> Duration {
        Duration::from_millis(self.keep_alive_period_ms)
    }

    pub fn health_check_period(&self) -> Duration {
        Duration::from_millis(self.health_check_period_ms)
    }
}
