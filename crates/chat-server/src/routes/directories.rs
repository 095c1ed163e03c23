use axum::extract::State;
use axum::Json;
use chat_core::session::SessionStore;

use crate::error::AppError;
use crate::routes::sessions::PathBody;
use crate::state::AppState;

/// POST /api/directories/validate — check a candidate working directory.
///
/// Always 200; `valid` says whether the path is usable and `error` why not.
pub async fn validate_directory(
    State(app): State<AppState>,
    Json(body): Json<PathBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = app
        .blocking(move |db| Ok(db.validate_directory(&body.path)))
        .await?;
    let json = match result {
        Ok(path) => serde_json::json!({
            "valid": true,
            "path": path.to_string_lossy(),
        }),
        Err(e) => serde_json::json!({
            "valid": false,
            "error": e.to_string(),
        }),
    };
    Ok(Json(json))
}
