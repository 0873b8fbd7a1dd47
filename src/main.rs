mod api;
mod blockchain;
mod config;
mod error;
mod network;
mod node;
mod transaction;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use api::AppNode;
use config::NodeConfig;
use network::HttpPeerClient;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = NodeConfig::from_env().map_err(|e| {
        error!("{}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let client = HttpPeerClient::new(config.peer_timeout, config.public_url.clone())
        .map_err(std::io::Error::other)?;

    let host = config.host.clone();
    let port = config.port;
    info!(
        "⛓️ Starting ledger node {} at http://{host}:{port} (miner: {}, difficulty: {})",
        config.node_id, config.miner_mode, config.ledger.difficulty
    );

    let node: Arc<AppNode> = Arc::new(AppNode::new(config, client));
    if node.config().miner_mode {
        actix_web::rt::spawn(node.clone().run_miner());
        actix_web::rt::spawn(node.clone().run_sweeper());
    }
    if !node.peers().is_empty() {
        let syncing = node.clone();
        actix_web::rt::spawn(async move {
            match syncing.resolve_consensus().await {
                Ok(true) => info!("SYNC - adopted a longer chain from peers"),
                Ok(false) => info!("SYNC - local chain kept"),
                Err(e) => error!("SYNC - start-up consensus failed: {}", e),
            }
        });
    }

    let data = web::Data::from(node);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(api::init_routes))
        .bind((host.as_str(), port))?
        .run()
        .await
}
