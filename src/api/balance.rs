use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppNode, BalanceResponse};
use super::node_error;

/// Balance projected from the committed chain. Unknown addresses read as zero.
#[get("/balance/{address}/")]
pub async fn get_balance(node: web::Data<AppNode>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    match node.balance(&address) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse { address, balance }),
        Err(e) => node_error(e),
    }
}
