use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// The peer protocol (`/chain`, `/ping`, `/blocks/receive`) shares the root
/// scope with the client endpoints.
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(handlers::get_chain))
        .route("/mine", web::get().to(handlers::mine_block))
        .route("/transactions/new", web::post().to(handlers::new_transaction))
        .route("/transactions/sign", web::post().to(handlers::sign_transaction))
        .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
        .route("/wallet", web::post().to(handlers::get_wallet_balance))
        .route("/accounts", web::get().to(handlers::get_all_accounts))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/nodes/register", web::post().to(handlers::register_nodes))
        .route("/nodes", web::get().to(handlers::get_nodes))
        .route("/nodes/resolve", web::get().to(handlers::resolve_conflicts))
        .route("/ping", web::post().to(handlers::ping))
        .route("/blocks/receive", web::post().to(handlers::receive_block));
}
