use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use log::{debug, warn};

use super::models::{
    AddressHistoryResponse, AppNode, NewTxRequest, NewTxResponse, PendingResponse,
    RejectedResponse,
};
use super::{error_body, node_error};
use crate::network::{NODE_BROADCAST, SOURCE_TYPE_HEADER};
use crate::node::Origin;
use crate::transaction::PoolResult;

/// Submit a transaction. Gossip from peers carries `X-Source-Type:
/// node_broadcast` and is not forwarded again.
#[post("/transactions/new/")]
pub async fn post_transaction(
    node: web::Data<AppNode>,
    req: HttpRequest,
    body: web::Json<NewTxRequest>,
) -> impl Responder {
    let origin = match req.headers().get(SOURCE_TYPE_HEADER) {
        Some(v) if v.as_bytes() == NODE_BROADCAST.as_bytes() => Origin::Peer,
        _ => Origin::Client,
    };
    let tx = match body.into_inner().into_transaction() {
        Ok(tx) => tx,
        Err(e) => {
            warn!("POST /transactions/new/ - rejected: {}", e);
            return error_body(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    debug!("POST /transactions/new/ - {:?} from {:?}", tx, origin);

    match node.submit_transaction(tx.clone(), origin).await {
        Ok(PoolResult::Accepted { batch_ready }) => HttpResponse::Created().json(NewTxResponse {
            result: "accepted",
            transaction: tx,
            batch_ready,
        }),
        Ok(PoolResult::Duplicate) => error_body(StatusCode::CONFLICT, "duplicate transaction"),
        Ok(PoolResult::Invalid(e)) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => node_error(e),
    }
}

#[get("/transactions/pending/")]
pub async fn get_pending(node: web::Data<AppNode>) -> impl Responder {
    match node.pending() {
        Ok(transactions) => HttpResponse::Ok().json(PendingResponse {
            count: transactions.len(),
            transactions,
        }),
        Err(e) => node_error(e),
    }
}

#[get("/transactions/rejected/")]
pub async fn get_rejected(node: web::Data<AppNode>) -> impl Responder {
    match node.rejected() {
        Ok(transactions) => HttpResponse::Ok().json(RejectedResponse {
            count: transactions.len(),
            transactions,
        }),
        Err(e) => node_error(e),
    }
}

/// Committed transactions that involve `address`, oldest first.
#[get("/transactions/address/{address}/")]
pub async fn get_address_transactions(
    node: web::Data<AppNode>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let address = path.into_inner().0;
    match node.transactions_for(&address) {
        Ok(transactions) => HttpResponse::Ok().json(AddressHistoryResponse {
            address,
            count: transactions.len(),
            transactions,
        }),
        Err(e) => node_error(e),
    }
}
