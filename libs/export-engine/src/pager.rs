use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use export_api::{BatchStorage, PageRequest, Record, StreamSink};

use crate::error::EngineError;

/// Bounded, stateless pagination over one batch's records.
///
/// A follow-up call with `start_order` past the last delivered record
/// continues exactly where the previous page stopped.
pub struct Pager {
    storage: Arc<dyn BatchStorage>,
}

impl Pager {
    pub fn new(storage: Arc<dyn BatchStorage>) -> Self {
        Self { storage }
    }

    /// Fetch one page without streaming it.
    pub async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>, EngineError> {
        if request.count == 0 {
            return Ok(Vec::new());
        }
        let mut records = self
            .storage
            .records_page(request)
            .await
            .map_err(|e| EngineError::Storage(e.with_context(format!("batch {}", request.batch_number))))?;
        records.truncate(request.count as usize);
        Ok(records)
    }

    /// Stream one page into `sink`, one record at a time.
    ///
    /// Returns the number of records delivered. Cancellation stops early
    /// with `Ok`; a sink failure stops with `Err(EngineError::Sink)`.
    pub async fn page(
        &self,
        request: &PageRequest,
        sink: &mut dyn StreamSink<Record>,
        cancel: &CancellationToken,
    ) -> Result<usize, EngineError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }

        let records = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(0),
            r = self.fetch(request) => r?,
        };

        let mut sent = 0;
        for record in records {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = sink.send(record) => r.map_err(EngineError::Sink)?,
            }
            sent += 1;
        }

        tracing::debug!(
            batch = request.batch_number,
            start_order = request.start_order,
            count = request.count,
            sent,
            "page delivered"
        );
        Ok(sent)
    }
}
