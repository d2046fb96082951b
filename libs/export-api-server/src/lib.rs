mod http;
mod wire;
mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use export_engine::{Pager, Tailer};

pub use wire::{WsAction, WsOut};

#[derive(Clone)]
pub struct AppState {
    pub(crate) tailer: Arc<Tailer>,
    pub(crate) pager: Arc<Pager>,
    /// Per-connection outbound queue size (backpressure window).
    pub(crate) ws_buffer: usize,
    pub(crate) default_page_count: i32,
    /// Parent of every connection and session token.
    pub(crate) shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        tailer: Arc<Tailer>,
        pager: Arc<Pager>,
        ws_buffer: usize,
        default_page_count: i32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tailer,
            pager,
            ws_buffer: ws_buffer.max(1),
            default_page_count,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(http::handle_health))
        .route("/api/batches/{number}/records", get(http::handle_page))
        .route("/ws", get(ws::handle_ws))
        .with_state(state)
}

/// Bind `0.0.0.0:{port}` and serve until `state.shutdown` fires.
pub async fn run(port: u16, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    tracing::info!(addr = ?listener.local_addr().ok(), "export api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
