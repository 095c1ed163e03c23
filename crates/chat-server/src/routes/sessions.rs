use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chat_core::model::{Attachment, Message, MessageBody, UserMessage};
use chat_core::paths;
use chat_core::session::SessionStore;
use chrono::Utc;

use crate::error::AppError;
use crate::state::{AppState, Frame};

/// GET /api/sessions — all sessions, most recently updated first.
pub async fn list_sessions(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let list = app.blocking(|db| db.list_sessions()).await?;
    Ok(Json(serde_json::json!(list)))
}

#[derive(serde::Deserialize)]
pub struct TitleBody {
    pub title: String,
}

/// POST /api/sessions — create a session.
pub async fn create_session(
    State(app): State<AppState>,
    Json(body): Json<TitleBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let record = app
        .blocking(move |db| db.create_session(&body.title))
        .await?;
    app.notify_sessions_changed();
    Ok((StatusCode::CREATED, Json(serde_json::json!(record))))
}

/// GET /api/sessions/{id} — one session's metadata plus its live status.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sid = id.clone();
    let record = app.blocking(move |db| db.get_session(&sid)).await?;
    let streaming = match app.find_hub(&id).await {
        Some(hub) => hub.live.lock().await.is_some(),
        None => false,
    };
    Ok(Json(serde_json::json!({
        "session": record,
        "streaming": streaming,
    })))
}

/// GET /api/sessions/{id}/messages — persisted messages merged with the live stream.
pub async fn list_messages(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    paths::validate_session_id(&id)?;
    let messages = match app.find_hub(&id).await {
        Some(hub) => {
            let live = hub.live.lock().await;
            app.merged_messages((*live).as_ref(), &id).await?
        }
        None => app.merged_messages(None, &id).await?,
    };
    Ok(Json(serde_json::json!(messages)))
}

#[derive(serde::Deserialize)]
pub struct AttachmentBody {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct UserMessageBody {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,
}

/// POST /api/sessions/{id}/messages — append a user message.
pub async fn post_message(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UserMessageBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if body.content.trim().is_empty() && body.attachments.is_empty() {
        return Err(AppError::bad_request("message has no content"));
    }
    let attachments = body
        .attachments
        .into_iter()
        .map(|a| Attachment {
            preview: a.preview,
            ..Attachment::from_name(a.name, a.size)
        })
        .collect();
    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        body: MessageBody::User(UserMessage {
            content: body.content,
            attachments,
        }),
    };

    // Under the hub lock so the stored row, the live fold and the frame agree.
    let (hub, mut guard) = app.attach(&id).await;
    let (sid, stored) = (id.clone(), message.clone());
    let persisted = app.blocking(move |db| db.append_message(&sid, &stored)).await;
    if persisted.is_ok() {
        if let (Some(live), MessageBody::User(user)) = ((*guard).as_mut(), &message.body) {
            live.reducer
                .push_user(message.id.clone(), user.clone(), Some(message.timestamp));
        }
        hub.publish(Frame::User {
            message: message.clone(),
        });
    }
    drop(guard);
    app.release(&id, &hub).await;
    persisted?;

    tracing::info!(session = %id, message = %message.id, "user message appended");
    app.notify_sessions_changed();
    Ok((StatusCode::CREATED, Json(serde_json::json!(message))))
}

/// PUT /api/sessions/{id}/title — rename a session.
pub async fn rename_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TitleBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = app
        .blocking(move |db| db.rename_session(&id, &body.title))
        .await?;
    app.notify_sessions_changed();
    Ok(Json(serde_json::json!(record)))
}

/// DELETE /api/sessions/{id} — delete a session and its messages.
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let sid = id.clone();
    app.blocking(move |db| db.delete_session(&sid)).await?;
    app.forget(&id).await;
    app.notify_sessions_changed();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(serde::Deserialize)]
pub struct PathBody {
    pub path: String,
}

/// PUT /api/sessions/{id}/cwd — set the session's working directory.
pub async fn set_working_directory(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PathBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = app
        .blocking(move |db| db.set_working_directory(&id, &body.path))
        .await?;
    app.notify_sessions_changed();
    Ok(Json(serde_json::json!(record)))
}
