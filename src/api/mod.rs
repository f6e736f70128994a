// API module
//
// HTTP surface of a node: client endpoints, the peer protocol and the
// OpenAPI document served by Swagger UI

pub mod handlers;
pub mod routes;

use utoipa::OpenApi;

use crate::blockchain;
use crate::network;

// Re-export main components for easier access
pub use routes::configure_routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_chain,
        handlers::mine_block,
        handlers::new_transaction,
        handlers::sign_transaction,
        handlers::get_pending_transactions,
        handlers::get_wallet_balance,
        handlers::get_all_accounts,
        handlers::validate_chain,
        handlers::register_nodes,
        handlers::get_nodes,
        handlers::resolve_conflicts,
        handlers::ping,
        handlers::receive_block
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::AccountBalance,
            network::ChainSnapshot,
            network::PeerInfo,
            network::PingRequest,
            network::PingResponse,
            handlers::TransactionRequest,
            handlers::TransactionResponse,
            handlers::SignRequest,
            handlers::SignResponse,
            handlers::MineResponse,
            handlers::WalletRequest,
            handlers::WalletResponse,
            handlers::RegisterNodesRequest,
            handlers::RegisterNodesResponse,
            handlers::ResolveResponse,
            handlers::ReceiveBlockResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger node endpoints")
    ),
    info(
        title = "PoW Ledger API",
        version = "0.1.0",
        description = "A minimal proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
