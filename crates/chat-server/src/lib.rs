pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Sessions
        .route(
            "/api/sessions",
            get(routes::sessions::list_sessions).post(routes::sessions::create_session),
        )
        .route(
            "/api/sessions/{id}",
            get(routes::sessions::get_session).delete(routes::sessions::delete_session),
        )
        .route(
            "/api/sessions/{id}/messages",
            get(routes::sessions::list_messages).post(routes::sessions::post_message),
        )
        .route(
            "/api/sessions/{id}/title",
            put(routes::sessions::rename_session),
        )
        .route(
            "/api/sessions/{id}/cwd",
            put(routes::sessions::set_working_directory),
        )
        // Live streams
        .route(
            "/api/sessions/{id}/stream",
            post(routes::stream::ingest_stream),
        )
        .route("/api/sessions/{id}/ws", get(routes::ws::session_socket))
        // Directories
        .route(
            "/api/directories/validate",
            post(routes::directories::validate_directory),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the chat server on `host:port`.
pub async fn serve(
    app_state: AppState,
    host: &str,
    port: u16,
    open_browser: bool,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    serve_on(app_state, listener, open_browser).await
}

/// Start the chat server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("chat server listening on http://{addr}");

    if open_browser {
        let url = format!("http://localhost:{}/api/sessions", addr.port());
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, "could not open browser");
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}
