use crate::handlers::onedrive::save_onedrive_configuration;
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn onedrive_routes(state: AppState) -> Router {
    Router::new()
        .route("/onedrive/configuration", post(save_onedrive_configuration))
        .with_state(state)
}
