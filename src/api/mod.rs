mod balance;
mod chain;
mod health;
pub mod models;
mod nodes;
mod tx;

use actix_web::HttpResponse;
use actix_web::web::{self, ServiceConfig};
use log::error;

use crate::error::NodeError;
use models::ErrorResponse;

pub use models::AppNode;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::get_block)
            .service(chain::post_block)
            .service(chain::mine_block)
            .service(tx::post_transaction)
            .service(tx::get_pending)
            .service(tx::get_rejected)
            .service(tx::get_address_transactions)
            .service(balance::get_balance)
            .service(nodes::resolve)
            .service(nodes::register)
            .service(nodes::get_peers)
            .service(nodes::get_info),
    );
}

pub(crate) fn error_body(status: actix_web::http::StatusCode, msg: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse { error: msg.into() })
}

/// Map a node failure onto a status code.
pub(crate) fn node_error(e: NodeError) -> HttpResponse {
    use actix_web::http::StatusCode;
    let status = match e {
        NodeError::Corrupted => StatusCode::SERVICE_UNAVAILABLE,
        NodeError::NotMiner => StatusCode::FORBIDDEN,
        NodeError::Chain(_) => StatusCode::BAD_REQUEST,
        NodeError::LockPoisoned | NodeError::MiningTask(_) => {
            error!("API - internal failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_body(status, e.to_string())
}
