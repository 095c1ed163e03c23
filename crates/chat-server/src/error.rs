use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_core::error::ChatError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for
/// failures that are not a `ChatError` (malformed request bodies and such).
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn join(e: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {e}"))
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<ChatError>() {
            Some(ChatError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            Some(ChatError::InvalidSessionId(_)) | Some(ChatError::InvalidTitle(_)) => {
                StatusCode::BAD_REQUEST
            }
            Some(ChatError::DirectoryNotFound(_)) | Some(ChatError::NotADirectory(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Some(ChatError::Store(_))
            | Some(ChatError::HomeNotFound)
            | Some(ChatError::Io(_))
            | Some(ChatError::Yaml(_))
            | Some(ChatError::Json(_))
            | None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        // The store's message is surfaced verbatim.
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
