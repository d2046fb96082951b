use serde::{Deserialize, Serialize};

use crate::filter::PrototypeFilter;
use crate::util::b64;

// ════════════════════════════════════════════════════════════════
//  Batch (pulse)
// ════════════════════════════════════════════════════════════════

/// A numbered unit of ingested data. Written by the ingestion process,
/// read-only to the export core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Strictly increasing ordering key, never reused.
    pub number: i64,
    pub prev_number: i64,
    /// Set once ingestion for this number has finished.
    pub is_complete: bool,
    /// No ingestion gap precedes this batch. Informational only.
    #[serde(default)]
    pub is_sequential: bool,
    /// Unix ms.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub record_count: i64,
}

/// What the tail stream delivers for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub number: i64,
    pub prev_number: i64,
    /// Records of the batch accepted by the session filter.
    pub match_count: i64,
}

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    State,
    Request,
    Result,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::State => f.write_str("state"),
            RecordType::Request => f.write_str("request"),
            RecordType::Result => f.write_str("result"),
        }
    }
}

/// An immutable data item belonging to a batch.
///
/// Byte fields serialize as URL-safe base64 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "b64")]
    pub reference: Vec<u8>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(with = "b64")]
    pub object_reference: Vec<u8>,
    /// Classification key matched by [`PrototypeFilter`].
    #[serde(with = "b64")]
    pub prototype_reference: Vec<u8>,
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
    /// Previous record of the same object; empty for the first one.
    #[serde(with = "b64", default)]
    pub prev_record_reference: Vec<u8>,
    #[serde(with = "b64", default)]
    pub hash: Vec<u8>,
    pub batch_number: i64,
    /// Unique within the batch; induces the page order.
    pub order: i32,
    #[serde(default)]
    pub timestamp: i64,
}

// ════════════════════════════════════════════════════════════════
//  PageRequest
// ════════════════════════════════════════════════════════════════

/// One bounded page of a batch's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub batch_number: i64,
    pub filter: PrototypeFilter,
    /// Inclusive lower bound on `Record::order`.
    pub start_order: i32,
    /// Hard upper bound on the number of records returned.
    pub count: u32,
}

impl PageRequest {
    pub fn new(batch_number: i64, filter: PrototypeFilter, start_order: i32, count: u32) -> Self {
        Self { batch_number, filter, start_order, count }
    }

    /// Request for the page that follows `last`, the final record of this page.
    /// `None` when `last.order` is `i32::MAX`: no record can come after it.
    pub fn after(&self, last: &Record) -> Option<Self> {
        Some(Self {
            batch_number: self.batch_number,
            filter: self.filter.clone(),
            start_order: last.order.checked_add(1)?,
            count: self.count,
        })
    }
}
