use serde::{Deserialize, Serialize};

use export_api::{BatchSummary, Record};

// ═══════════════════════════════════════════════════════════════
//  WebSocket protocol
// ═══════════════════════════════════════════════════════════════

/// Client → server. Prototype references are URL-safe base64.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WsAction {
    /// Open a tail session delivering batches with `number > after`.
    Tail {
        #[serde(default)]
        after: i64,
        #[serde(default)]
        prototypes: Vec<String>,
    },
    /// Stream one page of a batch's records, then `end`.
    Page {
        batch: i64,
        #[serde(default)]
        prototypes: Vec<String>,
        #[serde(default)]
        start: i32,
        count: i32,
    },
    /// Stop one session of this connection.
    Cancel { session: u64 },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOut {
    Started { session: u64 },
    Batch { session: u64, batch: BatchSummary },
    Record { session: u64, record: Record },
    /// Session finished: page exhausted or session cancelled.
    End { session: u64 },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<u64>,
        error: String,
    },
}

impl WsOut {
    pub fn error(session: Option<u64>, error: impl std::fmt::Display) -> Self {
        WsOut::Error { session, error: error.to_string() }
    }
}
