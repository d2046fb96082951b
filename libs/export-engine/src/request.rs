use export_api::{decode_reference, PageRequest, PrototypeFilter};

use crate::error::EngineError;

/// Build a filter from base64-encoded prototype references.
pub fn parse_filter<S: AsRef<str>>(prototypes: &[S]) -> Result<PrototypeFilter, EngineError> {
    prototypes
        .iter()
        .map(|p| {
            let p = p.as_ref();
            decode_reference(p).map_err(|e| EngineError::InvalidRequest(format!("prototype '{p}': {e}")))
        })
        .collect()
}

/// Validate raw page parameters as they arrive from a client.
///
/// Negative `start_order` or `count` is rejected; `count = 0` is accepted
/// and produces an empty page.
pub fn page_request<S: AsRef<str>>(
    batch_number: i64,
    prototypes: &[S],
    start_order: i32,
    count: i32,
) -> Result<PageRequest, EngineError> {
    if start_order < 0 {
        return Err(EngineError::InvalidRequest(format!("start must be >= 0, got {start_order}")));
    }
    let count = u32::try_from(count)
        .map_err(|_| EngineError::InvalidRequest(format!("count must be >= 0, got {count}")))?;
    Ok(PageRequest::new(batch_number, parse_filter(prototypes)?, start_order, count))
}
