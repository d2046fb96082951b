use std::future::Future;
use std::pin::Pin;

use crate::{Batch, BatchSummary, ExportError, PageRequest, PrototypeFilter, Record};

// ════════════════════════════════════════════════════════════════
//  Storage Port
// ════════════════════════════════════════════════════════════════

/// Read-only view of the batch store consumed by the export engine.
///
/// Implementations must be safe under concurrent calls from many sessions
/// and must agree on ordering and filtering: both delegate counting to
/// [`PrototypeFilter::count`] and page selection to [`crate::select_page`].
pub trait BatchStorage: Send + Sync {
    /// Earliest batch with `number > after` and `is_complete`.
    ///
    /// `Ok(None)` means no such batch exists yet; it is not an error.
    /// `match_count` counts the batch's records accepted by `filter`.
    fn next_complete_batch(
        &self,
        after: i64,
        filter: &PrototypeFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BatchSummary>, ExportError>> + Send + '_>>;

    /// One page of a batch's records, ordered by `order`.
    /// Unknown batch numbers yield an empty page.
    fn records_page(
        &self,
        request: &PageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, ExportError>> + Send + '_>>;
}

/// Write side used by the ingestion process, fixtures and tests.
/// The export engine never calls it.
pub trait BatchWriter: Send + Sync {
    /// Insert or replace batch metadata (e.g. flipping `is_complete`).
    fn put_batch(&self, batch: Batch) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    /// Append records to their batches (`Record::batch_number`).
    fn put_records(&self, records: &[Record]) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;
}
