use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;

use super::models::AppNode;

#[get("/health/")]
pub async fn health_check(node: web::Data<AppNode>) -> impl Responder {
    if node.is_corrupted() {
        return HttpResponse::ServiceUnavailable().json(json!({"status": "corrupted"}));
    }
    HttpResponse::Ok().json(json!({"status": "ok"}))
}
