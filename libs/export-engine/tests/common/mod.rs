#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use export_api::{Batch, BatchStorage, BatchWriter, PrototypeFilter, Record, RecordType};
use storage_file::{FileStorage, FileStorageConfig};
use storage_memory::MemoryStorage;

/// A storage instance seen through both ports.
pub struct Harness {
    pub storage: Arc<dyn BatchStorage>,
    pub writer: Arc<dyn BatchWriter>,
    _dir: Option<TempDir>,
}

pub fn memory() -> Harness {
    let store = Arc::new(MemoryStorage::new());
    Harness { storage: store.clone(), writer: store, _dir: None }
}

pub fn file() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStorage::new(&FileStorageConfig { data_dir: dir.path().join("batches") }));
    Harness { storage: store.clone(), writer: store, _dir: Some(dir) }
}

pub fn batch(number: i64, prev_number: i64, is_complete: bool) -> Batch {
    Batch {
        number,
        prev_number,
        is_complete,
        is_sequential: true,
        timestamp: number * 1000,
        record_count: 0,
    }
}

pub fn record(batch_number: i64, order: i32, prototype: &str) -> Record {
    Record {
        reference: format!("rec-{batch_number}-{order}").into_bytes(),
        record_type: match order % 3 {
            0 => RecordType::State,
            1 => RecordType::Request,
            _ => RecordType::Result,
        },
        object_reference: format!("obj-{}", order % 2).into_bytes(),
        prototype_reference: prototype.as_bytes().to_vec(),
        payload: format!("payload-{order}").into_bytes(),
        prev_record_reference: Vec::new(),
        hash: vec![order as u8; 4],
        batch_number,
        order,
        timestamp: batch_number * 1000 + order as i64,
    }
}

pub fn filter(prototypes: &[&str]) -> PrototypeFilter {
    prototypes.iter().map(|p| p.as_bytes().to_vec()).collect()
}

/// Standard data set:
///
/// - 10: five records, prototypes A B A B A
/// - 20: no records
/// - 30: order 0 prototype P, order 1 prototype Q
/// - 40: orders 0, 1, 2 with prototypes Q Q R
/// - 50: incomplete, one record
pub async fn seed(writer: &dyn BatchWriter) {
    writer.put_batch(batch(10, 0, true)).await.unwrap();
    writer.put_batch(batch(20, 10, true)).await.unwrap();
    writer.put_batch(batch(30, 20, true)).await.unwrap();
    writer.put_batch(batch(40, 30, true)).await.unwrap();
    writer.put_batch(batch(50, 40, false)).await.unwrap();

    // Deliberately out of order within a batch.
    writer
        .put_records(&[
            record(10, 3, "B"),
            record(10, 0, "A"),
            record(10, 4, "A"),
            record(10, 1, "B"),
            record(10, 2, "A"),
        ])
        .await
        .unwrap();
    writer.put_records(&[record(30, 0, "P"), record(30, 1, "Q")]).await.unwrap();
    writer
        .put_records(&[record(40, 2, "R"), record(40, 0, "Q"), record(40, 1, "Q")])
        .await
        .unwrap();
    writer.put_records(&[record(50, 0, "P")]).await.unwrap();
}

pub async fn seeded_memory() -> Harness {
    let h = memory();
    seed(h.writer.as_ref()).await;
    h
}

pub async fn seeded_file() -> Harness {
    let h = file();
    seed(h.writer.as_ref()).await;
    h
}

pub fn orders(records: &[Record]) -> Vec<i32> {
    records.iter().map(|r| r.order).collect()
}
