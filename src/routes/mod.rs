pub mod api;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::api::Reports;

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(reports): State<Reports>) -> impl IntoResponse {
    match reports.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

/// Full HTTP application: probes plus the read API.
pub fn app(reports: Reports) -> Router {
    let probes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(reports.clone());

    probes
        .merge(api::router(reports))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
