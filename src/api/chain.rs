use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, get, post, web};
use log::{info, warn};

use super::models::{AppNode, ChainResponse, MineResponse, ValidateResponse};
use super::{error_body, node_error};
use crate::blockchain::Block;
use crate::node::{MineOutcome, MineTrigger};

/// Get the full blockchain.
#[get("/chain/")]
pub async fn get_chain(node: web::Data<AppNode>) -> impl Responder {
    let (chain, difficulty) = match (node.get_chain(), node.difficulty()) {
        (Ok(chain), Ok(difficulty)) => (chain, difficulty),
        (Err(e), _) | (_, Err(e)) => return node_error(e),
    };
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        difficulty,
        chain: &chain,
    })
}

/// Validate the whole chain, balances included.
#[get("/chain/validate/")]
pub async fn validate_chain(node: web::Data<AppNode>) -> impl Responder {
    match (node.validate_chain(), node.chain_len()) {
        (Ok(valid), Ok(length)) => HttpResponse::Ok().json(ValidateResponse { valid, length }),
        (Err(e), _) | (_, Err(e)) => node_error(e),
    }
}

#[get("/blocks/{index}/")]
pub async fn get_block(node: web::Data<AppNode>, path: web::Path<(usize,)>) -> impl Responder {
    let index = path.into_inner().0;
    match node.get_block(index) {
        Ok(Some(block)) => HttpResponse::Ok().json(block),
        Ok(None) => error_body(StatusCode::NOT_FOUND, format!("block {index} not found")),
        Err(e) => node_error(e),
    }
}

/// A block announced by a peer.
#[post("/blocks/new/")]
pub async fn post_block(node: web::Data<AppNode>, body: web::Json<Block>) -> impl Responder {
    let block = body.into_inner();
    info!("POST /blocks/new/ - block #{} hash={}", block.index, block.hash);
    match node.receive_block(block).await {
        Ok(outcome) if outcome.accepted => HttpResponse::Created().json(outcome),
        Ok(outcome) => HttpResponse::Conflict().json(outcome),
        Err(e) => node_error(e),
    }
}

/// Mine everything pending right now, outside the batch trigger.
#[post("/mine/")]
pub async fn mine_block(node: web::Data<AppNode>) -> impl Responder {
    match node.mine_pending(MineTrigger::Manual).await {
        Ok(MineOutcome::Mined(block)) => HttpResponse::Created().json(MineResponse {
            mined_index: block.index,
            nonce: block.nonce,
            difficulty: block.difficulty,
            transactions: block.transactions.len(),
            hash: block.hash,
        }),
        Ok(MineOutcome::NothingToMine) => {
            error_body(StatusCode::BAD_REQUEST, "no pending transactions to mine")
        }
        Ok(MineOutcome::Busy) => error_body(StatusCode::CONFLICT, "mining already in progress"),
        Ok(MineOutcome::Abandoned) => {
            warn!("POST /mine/ - job abandoned, tip moved");
            error_body(StatusCode::CONFLICT, "chain tip moved while mining")
        }
        Err(e) => node_error(e),
    }
}
