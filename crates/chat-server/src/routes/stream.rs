use axum::extract::{Path, Query, State};
use axum::Json;
use chat_core::event::StreamEvent;
use chat_core::paths;
use chat_core::reducer::{Applied, StreamStatus};
use chat_core::session::SessionStore;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::state::{AppState, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Detect per line: chat events or agent SDK messages.
    #[default]
    Auto,
    Sdk,
    Events,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub format: InputFormat,
}

/// One decoded input line.
enum Line {
    Event(StreamEvent),
    Sdk(claude_agent::Message),
}

fn decode(line: &str, format: InputFormat) -> Result<Option<Line>, String> {
    let sdk = |line: &str| {
        claude_agent::decode_line(line)
            .map(|m| m.map(Line::Sdk))
            .map_err(|e| e.to_string())
    };
    match format {
        InputFormat::Events => serde_json::from_str(line)
            .map(|e| Some(Line::Event(e)))
            .map_err(|e| e.to_string()),
        InputFormat::Sdk => sdk(line),
        // The two vocabularies use disjoint `type` values.
        InputFormat::Auto => match serde_json::from_str::<StreamEvent>(line) {
            Ok(e) => Ok(Some(Line::Event(e))),
            Err(_) => sdk(line),
        },
    }
}

fn status_label(status: &StreamStatus) -> &'static str {
    match status {
        StreamStatus::Idle => "idle",
        StreamStatus::Streaming => "streaming",
        StreamStatus::Ended => "ended",
        StreamStatus::Failed(_) => "failed",
    }
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct IngestSummary {
    pub applied: usize,
    pub dropped: usize,
    pub skipped: usize,
    pub persisted: usize,
    pub status: String,
}

/// POST /api/sessions/{id}/stream — fold an NDJSON body into the session.
///
/// Each line is a chat stream event or an agent SDK message. Events are
/// applied to the session's live reducer and broadcast to subscribers;
/// finalized messages are persisted. The live reducer is dropped once the
/// stream ends.
pub async fn ingest_stream(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    body: String,
) -> Result<Json<IngestSummary>, AppError> {
    paths::validate_session_id(&id)?;
    let sid = id.clone();
    app.blocking(move |db| db.get_session(&sid)).await?;

    let (hub, mut guard) = app.attach_live(&id).await?;
    let Some(live) = (*guard).as_mut() else {
        return Err(anyhow::anyhow!("live session missing after attach").into());
    };

    let mut summary = IngestSummary::default();
    let mut events = Vec::new();
    for (n, raw) in body.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match decode(line, query.format) {
            Ok(Some(Line::Event(e))) => events.push(e),
            Ok(Some(Line::Sdk(m))) => events.extend(live.translator.translate(&m)),
            Ok(None) => summary.skipped += 1,
            Err(e) => {
                warn!(session = %id, line = n + 1, error = %e, "skipping undecodable line");
                summary.skipped += 1;
            }
        }
    }

    let mut ended = false;
    for event in events {
        match live.reducer.apply(event.clone()) {
            Applied::Dropped(_) => {
                summary.dropped += 1;
                continue;
            }
            Applied::Created(mid) | Applied::Updated(mid) => live.touch(&mid),
            Applied::Terminated(_) => ended = true,
            _ => {}
        }
        debug!(session = %id, event = event.kind(), "event applied");
        summary.applied += 1;
        hub.publish(Frame::Event { event });
    }
    summary.status = status_label(live.reducer.status()).to_string();

    let finished = live.take_finished();
    summary.persisted = finished.len();
    if !finished.is_empty() {
        let sid = id.clone();
        app.blocking(move |db| {
            for m in &finished {
                db.append_message(&sid, m)?;
            }
            Ok(())
        })
        .await?;
    }
    if ended {
        *guard = None;
        info!(session = %id, status = %summary.status, "stream ended; live session released");
    }
    drop(guard);
    if ended {
        app.release(&id, &hub).await;
    }

    if summary.persisted > 0 {
        app.notify_sessions_changed();
    }
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_detects_both_vocabularies() {
        let ev = r#"{"type":"text_delta","message_id":"m1","text":"x"}"#;
        assert!(matches!(
            decode(ev, InputFormat::Auto),
            Ok(Some(Line::Event(_)))
        ));
        let sdk = r#"{"type":"result","subtype":"success","session_id":"s"}"#;
        assert!(matches!(
            decode(sdk, InputFormat::Auto),
            Ok(Some(Line::Sdk(_)))
        ));
        let unknown = r#"{"type":"keep_alive"}"#;
        assert!(matches!(decode(unknown, InputFormat::Auto), Ok(None)));
    }

    #[test]
    fn explicit_format_rejects_the_other_vocabulary() {
        let sdk = r#"{"type":"result","subtype":"success","session_id":"s"}"#;
        assert!(decode(sdk, InputFormat::Events).is_err());
        assert!(decode("not json", InputFormat::Sdk).is_err());
    }
}
