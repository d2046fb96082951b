use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use export_api::{BatchStorage, BatchSummary, ErrorKind, PrototypeFilter, StreamSink};

use crate::backoff::Backoff;
use crate::config::TailConfig;
use crate::error::EngineError;

// ═══════════════════════════════════════════════════════════════
//  Tailer: poll loop turning "next complete batch" into a live tail
// ═══════════════════════════════════════════════════════════════

/// Turns the storage's "next complete batch after N" query into a live,
/// resumable stream of [`BatchSummary`].
///
/// Stateless between sessions: the cursor lives in [`Tailer::run`], so one
/// `Tailer` can serve any number of concurrent sessions.
pub struct Tailer {
    storage: Arc<dyn BatchStorage>,
    config: TailConfig,
}

impl Tailer {
    pub fn new(storage: Arc<dyn BatchStorage>, config: TailConfig) -> Self {
        Self { storage, config }
    }

    /// Deliver every complete batch with `number > cursor`, in increasing
    /// order, forever.
    ///
    /// Returns `Ok(())` once `cancel` fires and `Err(EngineError::Sink)`
    /// when the sink fails. Storage errors never escape: they are logged
    /// and retried after a bounded backoff.
    pub async fn run(
        &self,
        mut cursor: i64,
        filter: &PrototypeFilter,
        sink: &mut dyn StreamSink<BatchSummary>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let poll_interval = self.config.poll_interval();
        let mut backoff = Backoff::new(self.config.retry_initial(), self.config.retry_max());

        tracing::debug!(cursor, prototypes = filter.len(), "tail session started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let queried = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.storage.next_complete_batch(cursor, filter) => r,
            };

            let found = match queried {
                Ok(found) => {
                    backoff.reset();
                    found
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    let attempt = backoff.attempt();
                    let delay_ms = delay.as_millis() as u64;
                    if e.kind() == ErrorKind::Format {
                        tracing::error!(cursor, attempt, delay_ms, error = %e, "stored batch data is malformed, retrying");
                    } else {
                        tracing::warn!(cursor, attempt, delay_ms, error = %e, "next complete batch query failed, retrying");
                    }
                    if !pause(delay, cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let batch = match found {
                Some(batch) if batch.number > cursor => batch,
                Some(batch) => {
                    tracing::warn!(cursor, number = batch.number, "storage returned a batch at or below cursor");
                    if !pause(poll_interval, cancel).await {
                        break;
                    }
                    continue;
                }
                None => {
                    if !pause(poll_interval, cancel).await {
                        break;
                    }
                    continue;
                }
            };

            if batch.match_count == 0 && !self.config.emit_empty {
                tracing::trace!(number = batch.number, "skipping batch without matches");
                cursor = batch.number;
                continue;
            }

            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = sink.send(batch) => sent.map_err(EngineError::Sink)?,
            }

            tracing::debug!(number = batch.number, match_count = batch.match_count, "batch delivered");
            cursor = batch.number;
        }

        tracing::debug!(cursor, "tail session cancelled");
        Ok(())
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
