use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use export_api::ErrorKind;
use export_engine::{page_request, EngineError};

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/batches/{number}/records?start=&count=&prototypes=a,b
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct PageParams {
    start: Option<i32>,
    count: Option<i32>,
    /// Comma-separated base64 prototype references.
    prototypes: Option<String>,
}

pub(crate) async fn handle_page(
    State(state): State<AppState>,
    Path(number): Path<i64>,
    Query(params): Query<PageParams>,
) -> impl IntoResponse {
    let prototypes: Vec<&str> = params
        .prototypes
        .as_deref()
        .map(|s| s.split(',').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let request = match page_request(
        number,
        &prototypes,
        params.start.unwrap_or(0),
        params.count.unwrap_or(state.default_page_count),
    ) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("error: {e}")).into_response(),
    };

    match state.pager.fetch(&request).await {
        Ok(records) => axum::Json(records).into_response(),
        Err(EngineError::Storage(e)) if e.kind() == ErrorKind::Format => {
            tracing::error!(batch = number, error = %e, "stored page data is malformed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response()
        }
        Err(EngineError::Storage(e)) => {
            tracing::warn!(batch = number, error = %e, "page query failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("error: {e}")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response(),
    }
}
