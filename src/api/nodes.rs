use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, get, post, web};
use log::info;

use super::models::{AppNode, PeersResponse, RegisterRequest, RegisterResponse, ResolveResponse};
use super::{error_body, node_error};
use crate::network::peers::Registration;

/// Run a consensus pass against every known peer.
#[get("/nodes/resolve/")]
pub async fn resolve(node: web::Data<AppNode>) -> impl Responder {
    let replaced = match node.resolve_consensus().await {
        Ok(replaced) => replaced,
        Err(e) => return node_error(e),
    };
    match node.chain_len() {
        Ok(length) => HttpResponse::Ok().json(ResolveResponse { replaced, length }),
        Err(e) => node_error(e),
    }
}

#[post("/nodes/register/")]
pub async fn register(node: web::Data<AppNode>, body: web::Json<RegisterRequest>) -> impl Responder {
    let RegisterRequest { nodes } = body.into_inner();
    if nodes.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "please supply a list of nodes");
    }
    let added: Vec<String> = nodes
        .into_iter()
        .filter(|url| node.peers().register(url) == Registration::Added)
        .collect();
    info!("POST /nodes/register/ - {} new peers", added.len());
    HttpResponse::Created().json(RegisterResponse {
        added,
        total_nodes: node.peers().len(),
    })
}

#[get("/nodes/peers/")]
pub async fn get_peers(node: web::Data<AppNode>) -> impl Responder {
    let peers = node.peers().snapshot();
    HttpResponse::Ok().json(PeersResponse {
        count: peers.len(),
        peers,
    })
}

#[get("/nodes/info/")]
pub async fn get_info(node: web::Data<AppNode>) -> impl Responder {
    match node.info() {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => node_error(e),
    }
}
