use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use export_api::{BatchSummary, ExportError, Record, StreamSink};
use export_engine::{page_request, parse_filter, EngineError};

use super::AppState;
use crate::wire::{WsAction, WsOut};

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(socket, state))
}

/// Session task → socket writer. Every session of a connection shares one
/// bounded queue, and the writer awaits each socket send, so a slow
/// client slows all of its sessions.
struct MuxSink {
    session: u64,
    tx: mpsc::Sender<WsOut>,
}

impl MuxSink {
    async fn push(&self, out: WsOut) -> Result<(), ExportError> {
        self.tx
            .send(out)
            .await
            .map_err(|_| ExportError::sink("websocket closed"))
    }
}

impl StreamSink<BatchSummary> for MuxSink {
    fn send(&mut self, batch: BatchSummary) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.push(WsOut::Batch { session: self.session, batch }))
    }
}

impl StreamSink<Record> for MuxSink {
    fn send(&mut self, record: Record) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.push(WsOut::Record { session: self.session, record }))
    }
}

type Sessions = HashMap<u64, (CancellationToken, JoinHandle<()>)>;

// ═══════════════════════════════════════════════════════════════
//  Connection handler
// ═══════════════════════════════════════════════════════════════

async fn ws_connection(mut socket: WebSocket, state: AppState) {
    let (out_tx, mut out_rx) = mpsc::channel::<WsOut>(state.ws_buffer);
    let conn_cancel = state.shutdown.child_token();
    let mut sessions: Sessions = HashMap::new();
    let mut next_session: u64 = 1;

    loop {
        tokio::select! {
            biased;

            _ = conn_cancel.cancelled() => break,

            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let action: WsAction = match serde_json::from_str(&text) {
                    Ok(a) => a,
                    Err(e) => {
                        if send_out(&mut socket, &WsOut::error(None, format!("parse: {e}"))).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                sessions.retain(|_, (_, handle)| !handle.is_finished());

                let reply = match action {
                    WsAction::Cancel { session } => match sessions.remove(&session) {
                        Some((cancel, _)) => {
                            cancel.cancel();
                            None
                        }
                        None => Some(WsOut::error(Some(session), "unknown session")),
                    },
                    WsAction::Tail { after, prototypes } => {
                        let session = next_session;
                        next_session += 1;
                        Some(start_tail(&state, &conn_cancel, &out_tx, &mut sessions, session, after, &prototypes))
                    }
                    WsAction::Page { batch, prototypes, start, count } => {
                        let session = next_session;
                        next_session += 1;
                        Some(start_page(&state, &conn_cancel, &out_tx, &mut sessions, session, batch, &prototypes, start, count))
                    }
                };

                if let Some(reply) = reply {
                    if send_out(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
            }

            out = out_rx.recv() => {
                let Some(out) = out else { break };
                if send_out(&mut socket, &out).await.is_err() {
                    break;
                }
            }
        }
    }

    conn_cancel.cancel();
    drop(out_rx);
    for (_, (_, handle)) in sessions {
        let _ = handle.await;
    }
    tracing::debug!("websocket connection closed");
}

async fn send_out(socket: &mut WebSocket, out: &WsOut) -> Result<(), axum::Error> {
    match serde_json::to_string(out) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "serialize ws message");
            Ok(())
        }
    }
}

fn start_tail(
    state: &AppState,
    conn_cancel: &CancellationToken,
    out_tx: &mpsc::Sender<WsOut>,
    sessions: &mut Sessions,
    session: u64,
    after: i64,
    prototypes: &[String],
) -> WsOut {
    let filter = match parse_filter(prototypes) {
        Ok(f) => f,
        Err(e) => return WsOut::error(Some(session), e),
    };

    let cancel = conn_cancel.child_token();
    let task_cancel = cancel.clone();
    let tailer = state.tailer.clone();
    let tx = out_tx.clone();
    let handle = tokio::spawn(async move {
        tracing::info!(session, after, prototypes = filter.len(), "tail session opened");
        let mut sink = MuxSink { session, tx };
        let result = tailer.run(after, &filter, &mut sink, &task_cancel).await;
        finish(session, result, &sink.tx).await;
    });

    sessions.insert(session, (cancel, handle));
    WsOut::Started { session }
}

#[allow(clippy::too_many_arguments)]
fn start_page(
    state: &AppState,
    conn_cancel: &CancellationToken,
    out_tx: &mpsc::Sender<WsOut>,
    sessions: &mut Sessions,
    session: u64,
    batch: i64,
    prototypes: &[String],
    start: i32,
    count: i32,
) -> WsOut {
    let request = match page_request(batch, prototypes, start, count) {
        Ok(r) => r,
        Err(e) => return WsOut::error(Some(session), e),
    };

    let cancel = conn_cancel.child_token();
    let task_cancel = cancel.clone();
    let pager = state.pager.clone();
    let tx = out_tx.clone();
    let handle = tokio::spawn(async move {
        let mut sink = MuxSink { session, tx };
        let result = pager.page(&request, &mut sink, &task_cancel).await.map(|_| ());
        finish(session, result, &sink.tx).await;
    });

    sessions.insert(session, (cancel, handle));
    WsOut::Started { session }
}

/// Report how a session ended. A sink failure means the client is gone,
/// so there is nobody left to tell.
async fn finish(session: u64, result: Result<(), EngineError>, tx: &mpsc::Sender<WsOut>) {
    let out = match result {
        Ok(()) => WsOut::End { session },
        Err(EngineError::Sink(e)) => {
            tracing::debug!(session, error = %e, "session consumer gone");
            return;
        }
        Err(e) => {
            tracing::warn!(session, error = %e, "session failed");
            WsOut::error(Some(session), e)
        }
    };
    let _ = tx.send(out).await;
}
