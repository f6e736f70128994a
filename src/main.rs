use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::api::{self, ApiDoc};
use pow_ledger::blockchain::{Blockchain, Wallet};
use pow_ledger::config::{Args, NodeConfig};
use pow_ledger::network::HttpTransport;
use pow_ledger::node::Node;

// Open the ledger, persistent when a data directory is configured
fn initialize_blockchain(config: &NodeConfig) -> anyhow::Result<Blockchain> {
    let blockchain = match &config.data_dir {
        Some(data_dir) => {
            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
            let blockchain = Blockchain::with_storage(data_dir)
                .with_context(|| format!("Failed to load blockchain from {}", data_dir.display()))?;
            info!(
                "Loaded blockchain from storage at {} ({} blocks)",
                data_dir.display(),
                blockchain.chain_length()
            );
            blockchain
        }
        None => {
            info!("No data directory configured, keeping the chain in memory");
            Blockchain::new()
        }
    };

    Ok(blockchain.with_submit_policy(config.submit_policy))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from(Args::parse());

    let wallet = Wallet::load_or_create(&config.wallet_path)
        .with_context(|| format!("Failed to open wallet {}", config.wallet_path.display()))?;
    info!("Node identity: {}", wallet.address());

    let blockchain = initialize_blockchain(&config)?;
    let transport = HttpTransport::new(config.peer_timeout).context("Failed to build peer client")?;
    let node = Node::new(blockchain, wallet, Arc::new(transport), config.mining_timeout);

    for peer in &config.bootstrap_peers {
        match node.peers().register(peer) {
            Ok(key) => info!("Registered bootstrap peer {}", key),
            Err(err) => warn!("Skipping bootstrap peer {}: {}", peer, err),
        }
    }

    let cancel = CancellationToken::new();
    let worker = node.spawn_sync_worker(config.sync_interval, cancel.clone());

    let data = web::Data::new(node);
    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    let result = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(data.clone())
            .configure(api::configure_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?
    .run()
    .await;

    cancel.cancel();
    if let Err(err) = worker.await {
        warn!("Sync worker ended abnormally: {}", err);
    }

    result.context("HTTP server failed")
}
