//! HTTP intake (C5): router assembly, permissive CORS, request tracing,
//! and the rate-limit middleware scoped to the compile-submit route only.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

#[cfg(test)]
mod tests;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let compile_submit = Router::new()
        .route("/compile", post(handlers::submit_compile))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ));

    let api = Router::new()
        .merge(compile_submit)
        .route("/environments", get(handlers::environments))
        .route("/compile/{job_id}", get(handlers::poll_compile))
        .route("/workers/stats", get(handlers::worker_stats));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
