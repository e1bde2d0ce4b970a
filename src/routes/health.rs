use actix_web::{get, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

const SERVICE: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness check
///
/// Reports the service name, its version and the server time. Mounted outside
/// `/api` so it never goes through the auth middleware.
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": SERVICE,
        "version": VERSION,
        "timestamp": Utc::now()
    }))
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "Welcome to the Task Master API" }))
}
