//! `fabricd`: process wiring for one gateway — loads config, opens the
//! listener, dials configured peers, and runs the gossip/health-check
//! background loops until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fabric_gateway::{Gateway, GatewayConfig, PeerEndpoints};
use fabric_gossip::{NodeInfoManager, RouterManager};
use fabric_nodeinfo::GatewayNodeInfo;
use fabric_peer::{PacketHandler, PeerService};
use fabric_routing::RoutingTable;
use fabric_wire::PacketType;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "fabricd", about = "Gateway routing fabric daemon")]
struct Args {
    /// Path to the gateway's TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Override the listen address from the config file (ip:port).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// `log`-compatible level filter (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> anyhow::Result<GatewayConfig> {
    let text = std::fs::read_to_string(&args.config)
    .map_err(|err| anyhow::anyhow!("reading {}: {}", args.config.display(), err))?;
    let mut config: GatewayConfig = toml::from_str(&text)
    .map_err(|err| anyhow::anyhow!("parsing {}: {}", args.config.display(), err))?;
    if let Some(listen) = args.listen {
        config.listen_ip = listen.ip();
        config.listen_port = listen.port();
    }
    Ok(config)
}

/// Dial one peer endpoint; logged and skipped on failure, matching the
/// reconnection loop's retry-on-next-tick behavior (a failed dial is never
/// fatal to the daemon).
async fn dial(endpoint: String) -> Option<TcpStream> {
    match TcpStream::connect(&endpoint).await {
        Ok(stream) => Some(stream),
        Err(err) => {
            log::debug!("fabricd: dial to {} failed: {}", endpoint, err);
            None
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let peer_endpoints = PeerEndpoints::from_path(&config.peer_endpoints_file)?;

    if config.tls_cert_path.is_some() {
        log::warn!("fabricd: tls_cert_path is set but TLS material loading is out of scope; ignoring");
    }

    let routing = Arc::new(RwLock::new(RoutingTable::new(config.self_id.clone(), config.unreachable_distance)));
    let peer = PeerService::new(config.self_id.clone(), config.unreachable_distance, config.max_allowed_msg_size, routing.clone());

    let router_manager = RouterManager::new(config.self_id.clone(), Arc::clone(&peer), routing);
    let local_info = Arc::new(RwLock::new(GatewayNodeInfo::new(config.self_id.as_bytes().to_vec(), config.agency.clone())));
    let node_info_manager = NodeInfoManager::new(config.self_id.clone(), Arc::clone(&peer), Arc::clone(&local_info));

    let gateway = Gateway::new(
        config.self_id.clone(),
        Arc::clone(&peer),
        Arc::clone(&router_manager),
        Arc::clone(&node_info_manager),
        local_info,
        config.holding_ttl(),
    );

    peer.register_handler(PacketType::P2PMessage, Arc::clone(&gateway) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::BroadcastMessage, Arc::clone(&gateway) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::RouterTableSyncSeq, Arc::clone(&router_manager) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::RouterTableRequest, Arc::clone(&router_manager) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::RouterTableResponse, Arc::clone(&router_manager) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::SyncNodeSeq, Arc::clone(&node_info_manager) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::RequestNodeStatus, Arc::clone(&node_info_manager) as Arc<dyn PacketHandler>).await;
    peer.register_handler(PacketType::ResponseNodeStatus, Arc::clone(&node_info_manager) as Arc<dyn PacketHandler>).await;

    let cancel = CancellationToken::new();
    gateway.spawn_background_loops(
        config.router_sync_period(),
        config.node_info_sync_period(),
        config.health_check_period(),
        cancel.clone(),
    );

    tokio::spawn(Arc::clone(&peer).run_reconnect_loop(
            peer_endpoints.nodes.clone(),
            config.reconnect_period(),
            dial,
            cancel.clone(),
    ));

    let listen_addr = SocketAddr::new(config.listen_ip, config.listen_port);
    let listener = TcpListener::bind(listen_addr).await?;
    log::info!("fabricd: gateway {} ({}) listening on {}", config.self_id, config.agency, listen_addr);

    let accept_cancel = cancel.clone();
    let accept_peer = Arc::clone(&peer);
    let accept_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, remote_addr)) => {
                                let peer = Arc::clone(&accept_peer);
                                tokio::spawn(async move {
                                        if let Err(err) = peer.establish(None, stream).await {
                                            log::info!("fabricd: inbound connection from {} rejected: {}", remote_addr, err);
                                        }
                                });
                            }
                            Err(err) => log::warn!("fabricd: accept failed: {}", err),
                        }
                    }
                }
            }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("fabricd: shutdown requested");
    cancel.cancel();
    let _ = accept_loop.await;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.clone())).init();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_applies_listen_override() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("gateway.toml");
        std::fs::write(
            &config_path,
            r#"
            self_id = "gw-a"
            agency = "agency-x"
            listen_ip = "0.0.0.0"
            listen_port = 7000
            peer_endpoints_file = "peers.json"
            "#,
        )
        .unwrap();

        let args = Args { config: config_path, listen: Some("127.0.0.1:9001".parse().unwrap()), log_level: "info".into() };
        let config = load_config(&args).unwrap();
        assert_eq!(config.listen_port, 9001);
        assert_eq!(config.self_id, "gw-a");
    }
}
