use axum::http::StatusCode;
use chat_core::config::ChatConfig;
use chat_server::{build_router, AppState};
use futures::StreamExt;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app_state(dir: &TempDir) -> AppState {
    AppState::open(dir.path().to_path_buf(), ChatConfig::default()).unwrap()
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> (StatusCode, serde_json::Value) {
    let mut req = axum::http::Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        req = req.header("content-type", ct);
    }
    let req = req.body(axum::body::Body::from(body)).unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None, Vec::new()).await
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(
        app,
        "POST",
        uri,
        Some("application/json"),
        serde_json::to_vec(&body).unwrap(),
    )
    .await
}

async fn put_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(
        app,
        "PUT",
        uri,
        Some("application/json"),
        serde_json::to_vec(&body).unwrap(),
    )
    .await
}

async fn post_ndjson(app: axum::Router, uri: &str, lines: &[&str]) -> (StatusCode, serde_json::Value) {
    send(
        app,
        "POST",
        uri,
        Some("application/x-ndjson"),
        lines.join("\n").into_bytes(),
    )
    .await
}

async fn create(app: &axum::Router, title: &str) -> String {
    let (status, json) = post_json(
        app.clone(),
        "/api/sessions",
        serde_json::json!({ "title": title }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_list_rename_delete() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));

    let id = create(&app, "First chat").await;
    let (status, list) = get(app.clone(), "/api/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["title"], "First chat");

    let (status, renamed) = put_json(
        app.clone(),
        &format!("/api/sessions/{id}/title"),
        serde_json::json!({ "title": "Renamed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Renamed");

    let (status, _) = send(
        app.clone(),
        "DELETE",
        &format!("/api/sessions/{id}"),
        None,
        Vec::new(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, err) = get(app.clone(), &format!("/api/sessions/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(err["error"].as_str().unwrap().contains("session not found"));
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let (status, _) = post_json(
        app,
        "/api/sessions",
        serde_json::json!({ "title": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_session_id_is_400() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let (status, _) = get(app, "/api/sessions/not-a-uuid/messages").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn working_directory_and_validation() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let id = create(&app, "cwd").await;

    let (status, valid) = post_json(
        app.clone(),
        "/api/directories/validate",
        serde_json::json!({ "path": dir.path() }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(valid["valid"], true);

    let (_, invalid) = post_json(
        app.clone(),
        "/api/directories/validate",
        serde_json::json!({ "path": "/no/such/place" }),
    )
    .await;
    assert_eq!(invalid["valid"], false);
    assert!(invalid["error"].as_str().unwrap().contains("directory not found"));

    let (status, record) = put_json(
        app.clone(),
        &format!("/api/sessions/{id}/cwd"),
        serde_json::json!({ "path": dir.path() }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(record["working_directory"].is_string());

    let (status, _) = put_json(
        app,
        &format!("/api/sessions/{id}/cwd"),
        serde_json::json!({ "path": "/no/such/place" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ---------------------------------------------------------------------------
// Messages and streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn user_message_is_persisted() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let id = create(&app, "chat").await;

    let (status, msg) = post_json(
        app.clone(),
        &format!("/api/sessions/{id}/messages"),
        serde_json::json!({
            "content": "look at this",
            "attachments": [{ "name": "shot.png", "size": 1024 }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["role"], "user");
    assert_eq!(msg["attachments"][0]["mime_type"], "image/png");

    let (_, list) = get(app.clone(), &format!("/api/sessions/{id}/messages")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["content"], "look at this");

    let (status, _) = post_json(
        app,
        &format!("/api/sessions/{id}/messages"),
        serde_json::json!({ "content": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn event_stream_is_folded_and_persisted() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let id = create(&app, "stream").await;
    let uri = format!("/api/sessions/{id}/stream");

    let (status, summary) = post_ndjson(
        app.clone(),
        &uri,
        &[
            r#"{"type":"stream_start"}"#,
            r#"{"type":"text_delta","message_id":"m1","text":"Hel"}"#,
            r#"{"type":"tool_use","message_id":"m1","tool":{"id":"T1","name":"Task","input":{"description":"explore"}}}"#,
            r#"{"type":"tool_nested","tool":{"id":"n1","name":"Read","input":{"file_path":"/a"}}}"#,
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["applied"], 4);
    assert_eq!(summary["status"], "streaming");
    assert_eq!(summary["persisted"], 0);

    // In-flight messages are visible before anything is persisted.
    let (_, live) = get(app.clone(), &format!("/api/sessions/{id}/messages")).await;
    assert_eq!(live[0]["blocks"][1]["nested"][0]["name"], "Read");

    let (_, summary) = post_ndjson(
        app.clone(),
        &uri,
        &[
            r#"{"type":"text_delta","message_id":"m1","text":"lo"}"#,
            r#"{"type":"message_complete","message_id":"m1"}"#,
            r#"{"type":"text_delta","message_id":"m1","text":"!"}"#,
            "garbage",
            r#"{"type":"stream_end"}"#,
        ],
    )
    .await;
    assert_eq!(summary["applied"], 3);
    assert_eq!(summary["dropped"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["status"], "ended");

    let (_, list) = get(app.clone(), &format!("/api/sessions/{id}/messages")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["finalized"], true);
    assert_eq!(list[0]["blocks"][0]["text"], "Hel");
    assert_eq!(list[0]["blocks"][2]["text"], "lo");

    let (_, detail) = get(app, &format!("/api/sessions/{id}")).await;
    assert_eq!(detail["streaming"], false);
    assert_eq!(detail["session"]["message_count"], 1);
}

#[tokio::test]
async fn finalized_message_survives_a_later_stream() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let id = create(&app, "replayed").await;
    let uri = format!("/api/sessions/{id}/stream");

    post_ndjson(
        app.clone(),
        &uri,
        &[
            r#"{"type":"text_delta","message_id":"m1","text":"Hello"}"#,
            r#"{"type":"message_complete","message_id":"m1"}"#,
            r#"{"type":"stream_end"}"#,
        ],
    )
    .await;

    let (status, summary) = post_ndjson(
        app.clone(),
        &uri,
        &[
            r#"{"type":"text_delta","message_id":"m1","text":"rewritten"}"#,
            r#"{"type":"text_delta","message_id":"m2","text":"new turn"}"#,
            r#"{"type":"stream_end"}"#,
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["dropped"], 1);
    assert_eq!(summary["applied"], 2);
    assert_eq!(summary["persisted"], 1);

    let (_, list) = get(app, &format!("/api/sessions/{id}/messages")).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], "m1");
    assert_eq!(list[0]["blocks"].as_array().unwrap().len(), 1);
    assert_eq!(list[0]["blocks"][0]["text"], "Hello");
    assert_eq!(list[1]["id"], "m2");
    assert_eq!(list[1]["finalized"], true);
}

#[tokio::test]
async fn user_message_mid_stream_keeps_time_order() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let id = create(&app, "interleaved").await;
    let uri = format!("/api/sessions/{id}/stream");

    post_ndjson(
        app.clone(),
        &uri,
        &[r#"{"type":"text_delta","message_id":"a1","text":"thinking about it"}"#],
    )
    .await;
    // Stored keys have millisecond resolution.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, user) = post_json(
        app.clone(),
        &format!("/api/sessions/{id}/messages"),
        serde_json::json!({ "content": "also check the tests" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, list) = get(app.clone(), &format!("/api/sessions/{id}/messages")).await;
    let ids: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["a1".to_string(), user["id"].as_str().unwrap().to_string()]);

    // The end of the stream persists only the assistant turn.
    let (_, summary) = post_ndjson(app.clone(), &uri, &[r#"{"type":"stream_end"}"#]).await;
    assert_eq!(summary["persisted"], 1);
    let (_, list) = get(app, &format!("/api/sessions/{id}/messages")).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[0]["id"], "a1");
}

#[tokio::test]
async fn session_hub_is_released_when_stream_ends() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = build_router(state.clone());
    let id = create(&app, "hub").await;
    let uri = format!("/api/sessions/{id}/stream");

    post_ndjson(
        app.clone(),
        &uri,
        &[r#"{"type":"text_delta","message_id":"m1","text":"hi"}"#],
    )
    .await;
    assert!(state.find_hub(&id).await.is_some());

    post_ndjson(app.clone(), &uri, &[r#"{"type":"stream_end"}"#]).await;
    assert!(state.find_hub(&id).await.is_none());

    // Posting to an idle session leaves nothing behind either.
    post_json(
        app,
        &format!("/api/sessions/{id}/messages"),
        serde_json::json!({ "content": "later" }),
    )
    .await;
    assert!(state.find_hub(&id).await.is_none());
}

#[tokio::test]
async fn sdk_stream_is_translated() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let id = create(&app, "sdk").await;

    let (status, summary) = post_ndjson(
        app.clone(),
        &format!("/api/sessions/{id}/stream?format=sdk"),
        &[
            r#"{"type":"system","subtype":"init","session_id":"a","model":"claude","tools":["Bash"],"uuid":"sys-1"}"#,
            r#"{"type":"assistant","session_id":"a","message":{"id":"m1","content":[{"type":"text","text":"Running"},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}]}}"#,
            r#"{"type":"result","subtype":"success","session_id":"a","result":"ok"}"#,
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["status"], "ended");
    assert_eq!(summary["persisted"], 2);

    let (_, list) = get(app, &format!("/api/sessions/{id}/messages")).await;
    assert_eq!(list[0]["role"], "system");
    assert_eq!(list[1]["blocks"][1]["input"]["command"], "ls");
}

#[tokio::test]
async fn stream_to_unknown_session_is_404() {
    let dir = TempDir::new().unwrap();
    let app = build_router(app_state(&dir));
    let missing = uuid::Uuid::new_v4();
    let (status, _) = post_ndjson(
        app,
        &format!("/api/sessions/{missing}/stream"),
        &[r#"{"type":"stream_end"}"#],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn websocket_sends_snapshot_then_live_events() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = build_router(state.clone());
    let id = create(&app, "ws").await;
    post_json(
        app.clone(),
        &format!("/api/sessions/{id}/messages"),
        serde_json::json!({ "content": "hello" }),
    )
    .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(chat_server::serve_on(state, listener, false));

    let url = format!("ws://127.0.0.1:{port}/api/sessions/{id}/ws");
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    let first = socket.next().await.unwrap().unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["messages"][0]["content"], "hello");

    post_ndjson(
        app,
        &format!("/api/sessions/{id}/stream"),
        &[r#"{"type":"text_delta","message_id":"m1","text":"hi"}"#],
    )
    .await;

    let next = socket.next().await.unwrap().unwrap();
    let frame: serde_json::Value = serde_json::from_str(next.to_text().unwrap()).unwrap();
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"]["type"], "text_delta");
    assert_eq!(frame["event"]["text"], "hi");
}
