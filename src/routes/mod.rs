//! Router assembly.

mod common;
mod entity;
mod onedrive;

pub use common::common_routes;
pub use entity::entity_routes;
pub use onedrive::onedrive_routes;

use crate::state::AppState;
use axum::{body::Body, http::Request, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// All routes with request tracing and a request body cap.
pub fn app_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(entity_routes(state.clone()))
        .merge(onedrive_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                user = tracing::field::Empty,
            )
        }))
}
