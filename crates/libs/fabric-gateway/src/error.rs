/// Errors raised while loading a gateway's configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("failed to parse peer-endpoint file {0:?}: {1}")]
    PeerList(String, #[source] serde_json::Error),
}
