use actix_web::{web, HttpResponse, Responder};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::transaction::TransactionError;
use crate::blockchain::{AccountBalance, Address, Block, BlockchainError, DigitalSignature, Transaction};
use crate::network::sync::ping_response;
use crate::network::{ChainSnapshot, PeerInfo, PingRequest, PingResponse};
use crate::node::{Node, NodeError};

/// Shared node state handed to every handler
pub type NodeData = web::Data<Node>;

fn error_body(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": message.into() })
}

/// Request for the new transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address (hex public key)
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: u64,

    /// Hex-encoded ed25519 signature over the transaction
    pub signature: String,
}

/// Response for the new transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,

    pub signature: String,
}

/// Request for the sign endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignRequest {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,

    /// Hex-encoded private key of the sender
    pub signkey: String,
}

/// Response for the sign endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignResponse {
    pub message: String,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub signature: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Request for the wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletRequest {
    pub wallet: String,
}

/// Response for the wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub wallet: String,

    /// Committed balance
    pub amount: i64,

    /// Net effect of transactions still pending
    pub pending: i64,
}

/// Request for the register nodes endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    pub nodes: Vec<String>,
}

/// Response for the register nodes endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

/// Response for the resolve endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<Block>,
}

/// Response for the receive block endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReceiveBlockResponse {
    pub accepted: bool,
    pub length: usize,
}

/// Get the full blockchain
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainSnapshot)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(ChainSnapshot::new(node.ledger().chain()))
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().pending_transactions())
}

/// Create a new transaction
///
/// Verifies the signature and the sender's spendable balance, then adds the
/// transaction to the pending pool
#[utoipa::path(
    post,
    path = "/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction pooled", body = TransactionResponse),
        (status = 400, description = "Missing fields, bad signature or insufficient funds")
    )
)]
pub async fn new_transaction(node: NodeData, request: web::Json<TransactionRequest>) -> impl Responder {
    let request = request.into_inner();

    let signature = match request.signature.parse::<DigitalSignature>() {
        Ok(signature) => signature,
        Err(err) => {
            return HttpResponse::BadRequest().json(error_body(format!("Malformed signature: {}", err)));
        }
    };

    let transaction = Transaction::new(
        Address(request.sender),
        Address(request.recipient),
        request.amount,
    );

    // Signature and balance are checked under the same lock that pools the transaction
    match node.ledger().submit_checked(transaction, &signature) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", block_index),
            block_index,
            signature: signature.to_string(),
        }),
        Err(BlockchainError::TransactionError(TransactionError::InvalidSignature)) => {
            HttpResponse::BadRequest().json(error_body("Wrong signature"))
        }
        Err(BlockchainError::TransactionError(TransactionError::InsufficientFunds { .. })) => {
            HttpResponse::BadRequest().json(error_body("Wallet has not enough tokens"))
        }
        Err(err) => HttpResponse::BadRequest().json(error_body(format!("Failed to add transaction: {}", err))),
    }
}

/// Sign a transaction
///
/// For testing only: the private key travels in the request
#[utoipa::path(
    post,
    path = "/transactions/sign",
    request_body = SignRequest,
    responses(
        (status = 200, description = "Transaction signed", body = SignResponse),
        (status = 400, description = "Invalid private key")
    )
)]
pub async fn sign_transaction(request: web::Json<SignRequest>) -> impl Responder {
    let request = request.into_inner();
    let transaction = Transaction::new(
        Address(request.sender.clone()),
        Address(request.recipient.clone()),
        request.amount,
    );

    match transaction.sign_with_secret_hex(&request.signkey) {
        Ok(signature) => HttpResponse::Ok().json(SignResponse {
            message: "for testing purposes only".to_string(),
            sender: request.sender,
            recipient: request.recipient,
            amount: request.amount,
            signature: signature.to_string(),
        }),
        Err(err) => HttpResponse::BadRequest().json(error_body(format!("Invalid private key: {}", err))),
    }
}

/// Mine a new block
///
/// Runs the proof of work and seals all pending transactions plus the
/// mining reward
#[utoipa::path(
    get,
    path = "/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 409, description = "The chain moved while mining"),
        (status = 503, description = "Proof search timed out")
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    match node.mine().await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Forged".to_string(),
            block,
        }),
        Err(NodeError::BlockchainError(err @ BlockchainError::StaleProof { .. })) => {
            HttpResponse::Conflict().json(error_body(err.to_string()))
        }
        Err(err @ NodeError::MiningTimedOut(_)) => {
            HttpResponse::ServiceUnavailable().json(error_body(err.to_string()))
        }
        Err(err) => {
            warn!("Mining failed: {}", err);
            HttpResponse::InternalServerError().json(error_body(format!("Failed to mine block: {}", err)))
        }
    }
}

/// Check if the blockchain is valid
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().is_valid())
}

/// Get wallet balance
///
/// Returns the committed balance of a wallet and the net of its pending transactions
#[utoipa::path(
    post,
    path = "/wallet",
    request_body = WalletRequest,
    responses(
        (status = 200, description = "Wallet balance retrieved successfully", body = WalletResponse),
        (status = 400, description = "Missing wallet id")
    )
)]
pub async fn get_wallet_balance(node: NodeData, request: web::Json<WalletRequest>) -> impl Responder {
    let address = Address(request.into_inner().wallet);

    HttpResponse::Ok().json(WalletResponse {
        amount: node.ledger().balance_of(&address),
        pending: node.ledger().pending_net_for(&address),
        wallet: address.0,
    })
}

/// Get all balances
#[utoipa::path(
    get,
    path = "/accounts",
    responses(
        (status = 200, description = "Balances retrieved successfully", body = Vec<AccountBalance>)
    )
)]
pub async fn get_all_accounts(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().accounts())
}

/// Register peers
#[utoipa::path(
    post,
    path = "/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Peers registered", body = RegisterNodesResponse),
        (status = 400, description = "Missing or unparsable address")
    )
)]
pub async fn register_nodes(node: NodeData, request: web::Json<RegisterNodesRequest>) -> impl Responder {
    if request.nodes.is_empty() {
        return HttpResponse::BadRequest().json(error_body("Please supply a valid list of nodes"));
    }

    for address in &request.nodes {
        if let Err(err) = node.peers().register(address) {
            return HttpResponse::BadRequest().json(error_body(err.to_string()));
        }
    }

    HttpResponse::Created().json(RegisterNodesResponse {
        message: "New nodes have been added".to_string(),
        total_nodes: node.peers().addresses(),
    })
}

/// List known peers
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Known peers", body = Vec<PeerInfo>)
    )
)]
pub async fn get_nodes(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.peers().peers())
}

/// Resolve conflicts
///
/// Fetches every peer's chain and adopts the longest valid one
#[utoipa::path(
    get,
    path = "/nodes/resolve",
    responses(
        (status = 200, description = "Consensus round finished", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    let replaced = node.sync().resolve_conflicts().await;
    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced,
        chain: node.ledger().chain(),
    })
}

/// Answer a chain-length announcement
///
/// Replies with this node's identity and the blocks the caller is missing
#[utoipa::path(
    post,
    path = "/ping",
    request_body = PingRequest,
    responses(
        (status = 200, description = "Identity and missing blocks", body = PingResponse)
    )
)]
pub async fn ping(node: NodeData, request: web::Json<PingRequest>) -> impl Responder {
    HttpResponse::Ok().json(ping_response(node.ledger(), node.wallet().address(), request.chainlength))
}

/// Accept a block pushed by a peer
#[utoipa::path(
    post,
    path = "/blocks/receive",
    request_body = Block,
    responses(
        (status = 200, description = "Whether the block was appended", body = ReceiveBlockResponse)
    )
)]
pub async fn receive_block(node: NodeData, block: web::Json<Block>) -> impl Responder {
    let accepted = node.ledger().append_foreign_block(block.into_inner());

    HttpResponse::Ok().json(ReceiveBlockResponse {
        accepted,
        length: node.ledger().chain_length(),
    })
}
