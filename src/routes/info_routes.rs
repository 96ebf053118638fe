use axum::{
    routing::get,
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use tracing::{debug, error};
use serde::Serialize;

pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info_check))
}

pub async fn info_check() -> Response {
    match crate::utils::conf_helper::get_cached_config() {
        Some(config) => {
            debug!("{} requested", config.name);
            Json(config).into_response()
        }
        None => {
            error!("Info requested before config was initialized");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    version: &'static str,
}
