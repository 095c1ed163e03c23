use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use chat_core::session::SessionStore;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::state::{AppState, Frame};

/// GET /api/sessions/{id}/ws — live view of one session.
///
/// The first frame is always a `snapshot` (persisted plus in-flight
/// messages); every later frame is a live `event` or `user` frame. A client
/// that reconnects simply gets a fresh snapshot.
pub async fn session_socket(
    ws: WebSocketUpgrade,
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let sid = id.clone();
    app.blocking(move |db| db.get_session(&sid)).await?;

    // Snapshot and subscription are taken under the hub lock so no event
    // falls between them or lands in both.
    let (hub, guard) = app.attach(&id).await;
    let rx = hub.tx.subscribe();
    let merged = app.merged_messages((*guard).as_ref(), &id).await;
    drop(guard);
    let messages = match merged {
        Ok(messages) => messages,
        Err(e) => {
            drop(rx);
            app.release(&id, &hub).await;
            return Err(e);
        }
    };
    let snapshot = Frame::Snapshot {
        session_id: id.clone(),
        messages,
    };
    Ok(ws.on_upgrade(move |socket| async move {
        handle_socket(socket, &id, snapshot, rx).await;
        app.release(&id, &hub).await;
    }))
}

/// Per-socket task: forwards frames to the client and watches for close.
/// Returns once both halves are done and the receiver is dropped.
async fn handle_socket(
    socket: WebSocket,
    session: &str,
    snapshot: Frame,
    mut rx: broadcast::Receiver<Frame>,
) {
    info!(session = %session, "websocket connected");
    let (mut sink, mut stream) = socket.split();

    let sink_session = session.to_string();
    let mut sink_task = tokio::spawn(async move {
        if send_frame(&mut sink, &snapshot).await.is_err() {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // The client's view is now incomplete; it must reconnect to resync.
                    warn!(session = %sink_session, skipped = n, "subscriber lagged; closing");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                WsMessage::Close(_) => break,
                other => debug!(?other, "ignoring inbound websocket frame"),
            }
        }
    });

    tokio::select! {
        _ = &mut sink_task => read_task.abort(),
        _ = &mut read_task => {
            sink_task.abort();
            // The receiver must be gone before the hub can be released.
            let _ = sink_task.await;
        }
    }
    info!(session = %session, "websocket disconnected");
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), ()>
where
    S: futures::Sink<WsMessage> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(WsMessage::Text(text.into())).await.map_err(|_| ())
}
