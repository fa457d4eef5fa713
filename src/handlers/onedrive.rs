//! Per-user OneDrive (rclone) configuration.

use crate::error::AppError;
use crate::extractors::AuthSession;
use crate::response::empty;
use crate::rocrate::manager::ONEDRIVE;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::Value;

/// POST /onedrive/configuration: store the body under the session's `rclone.onedrive` key.
pub async fn save_onedrive_configuration(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(config): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    if !config.is_object() {
        return Err(AppError::BadRequest("OneDrive configuration must be a JSON object".into()));
    }
    let session_id = auth.session.id;
    let mut session = state
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown session".into()))?;
    session.data.set_rclone_remote(ONEDRIVE, config);
    state.sessions.update_session_data(session_id, &session.data).await?;
    tracing::info!(%session_id, user = %auth.user.email, "saved OneDrive configuration");
    Ok(empty())
}
