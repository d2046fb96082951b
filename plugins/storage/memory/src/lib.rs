use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::RwLock;

use export_api::{
    select_page, Batch, BatchStorage, BatchSummary, BatchWriter, ExportError, PageRequest,
    PrototypeFilter, Record,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct MemoryStorageConfig {
    /// JSON file with `{"batches": [...], "records": [...]}` loaded at startup.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

/// Contents of a fixture file.
#[derive(Debug, Default, serde::Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExportError::config(format!("fixture '{}': {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| ExportError::config(format!("fixture '{}': {e}", path.display())))
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorage
// ═══════════════════════════════════════════════════════════════

/// One arena slot. Records may arrive before the batch metadata.
#[derive(Default)]
struct BatchSlot {
    batch: Option<Batch>,
    records: Vec<Record>,
}

/// In-memory batch store: an arena keyed by batch number, owned by this
/// instance. Two instances never share data.
#[derive(Default)]
pub struct MemoryStorage {
    arena: RwLock<BTreeMap<i64, BatchSlot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config, loading the fixture if one is set.
    pub async fn open(config: &MemoryStorageConfig) -> Result<Self, ExportError> {
        let storage = Self::new();
        if let Some(path) = &config.fixture {
            let fixture = Fixture::load(path)?;
            let (batches, records) = (fixture.batches.len(), fixture.records.len());
            storage.load(fixture).await?;
            tracing::info!(fixture = %path.display(), batches, records, "memory storage loaded fixture");
        }
        Ok(storage)
    }

    pub async fn load(&self, fixture: Fixture) -> Result<(), ExportError> {
        for batch in fixture.batches {
            self.put_batch(batch).await?;
        }
        self.put_records(&fixture.records).await
    }
}

impl BatchStorage for MemoryStorage {
    fn next_complete_batch(
        &self,
        after: i64,
        filter: &PrototypeFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BatchSummary>, ExportError>> + Send + '_>> {
        let filter = filter.clone();
        Box::pin(async move {
            let arena = self.arena.read().await;
            let found = arena
                .range((Bound::Excluded(after), Bound::Unbounded))
                .find_map(|(_, slot)| {
                    let batch = slot.batch.as_ref().filter(|b| b.is_complete)?;
                    Some(BatchSummary {
                        number: batch.number,
                        prev_number: batch.prev_number,
                        match_count: filter.count(&slot.records),
                    })
                });
            Ok(found)
        })
    }

    fn records_page(
        &self,
        request: &PageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, ExportError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move {
            let arena = self.arena.read().await;
            let Some(slot) = arena.get(&request.batch_number) else {
                return Ok(Vec::new());
            };
            Ok(select_page(
                slot.records.iter().cloned(),
                &request.filter,
                request.start_order,
                request.count,
            ))
        })
    }
}

impl BatchWriter for MemoryStorage {
    fn put_batch(&self, batch: Batch) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(async move {
            let mut arena = self.arena.write().await;
            let number = batch.number;
            arena.entry(number).or_default().batch = Some(batch);
            Ok(())
        })
    }

    fn put_records(&self, records: &[Record]) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        let records = records.to_vec();
        Box::pin(async move {
            let mut arena = self.arena.write().await;

            // Validate the whole call before touching the arena.
            let mut seen: HashSet<(i64, i32)> = HashSet::new();
            for record in &records {
                let taken = arena
                    .get(&record.batch_number)
                    .is_some_and(|slot| slot.records.iter().any(|r| r.order == record.order));
                if taken || !seen.insert((record.batch_number, record.order)) {
                    return Err(ExportError::new(format!(
                        "batch {}: duplicate record order {}",
                        record.batch_number, record.order
                    )));
                }
            }

            for record in records {
                arena.entry(record.batch_number).or_default().records.push(record);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use export_api::RecordType;

    use super::*;

    fn batch(number: i64, is_complete: bool) -> Batch {
        Batch {
            number,
            prev_number: number - 10,
            is_complete,
            is_sequential: true,
            timestamp: 0,
            record_count: 0,
        }
    }

    fn record(batch_number: i64, order: i32) -> Record {
        Record {
            reference: vec![batch_number as u8, order as u8],
            record_type: RecordType::State,
            object_reference: vec![1],
            prototype_reference: b"P".to_vec(),
            payload: Vec::new(),
            prev_record_reference: Vec::new(),
            hash: Vec::new(),
            batch_number,
            order,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn incomplete_batches_are_invisible_until_completed() {
        let storage = MemoryStorage::new();
        storage.put_batch(batch(10, false)).await.unwrap();
        assert_eq!(storage.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap(), None);

        storage.put_batch(batch(10, true)).await.unwrap();
        let found = storage.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap();
        assert_eq!(found.map(|b| b.number), Some(10));
    }

    #[tokio::test]
    async fn records_without_metadata_are_not_a_batch() {
        let storage = MemoryStorage::new();
        storage.put_records(&[record(10, 0)]).await.unwrap();
        assert_eq!(storage.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap(), None);

        let page = storage
            .records_page(&PageRequest::new(10, PrototypeFilter::all(), 0, 10))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn rejects_duplicate_order() {
        let storage = MemoryStorage::new();
        storage.put_records(&[record(10, 0)]).await.unwrap();
        let err = storage.put_records(&[record(10, 0)]).await.unwrap_err();
        assert!(err.message().contains("duplicate record order"));
    }

    #[tokio::test]
    async fn rejected_call_commits_nothing() {
        let storage = MemoryStorage::new();
        storage.put_records(&[record(10, 0)]).await.unwrap();

        let err = storage
            .put_records(&[record(10, 1), record(20, 0), record(10, 0)])
            .await
            .unwrap_err();
        assert!(err.message().contains("duplicate record order"));

        let err = storage.put_records(&[record(30, 5), record(30, 5)]).await.unwrap_err();
        assert!(err.message().contains("duplicate record order"));

        for number in [10, 20, 30] {
            let page = storage
                .records_page(&PageRequest::new(number, PrototypeFilter::all(), 0, 10))
                .await
                .unwrap();
            let expected = if number == 10 { 1 } else { 0 };
            assert_eq!(page.len(), expected, "batch {number}");
        }
    }

    #[tokio::test]
    async fn instances_do_not_share_state() {
        let a = MemoryStorage::new();
        let b = MemoryStorage::new();
        a.put_batch(batch(10, true)).await.unwrap();
        assert!(b.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn opens_fixture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        let fixture = serde_json::json!({
            "batches": [{"number": 10, "prev_number": 0, "is_complete": true}],
            "records": [{
                "reference": "AQ",
                "type": "state",
                "object_reference": "Ag",
                "prototype_reference": "Aw",
                "payload": "",
                "batch_number": 10,
                "order": 0
            }]
        });
        std::fs::write(&path, fixture.to_string()).unwrap();

        let storage = MemoryStorage::open(&MemoryStorageConfig { fixture: Some(path) }).await.unwrap();
        let found = storage.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap().unwrap();
        assert_eq!(found, BatchSummary { number: 10, prev_number: 0, match_count: 1 });
    }

    #[tokio::test]
    async fn missing_fixture_is_config_error() {
        let config = MemoryStorageConfig { fixture: Some(PathBuf::from("/nonexistent/fixture.json")) };
        let err = MemoryStorage::open(&config).await.err().unwrap();
        assert_eq!(err.kind(), export_api::ErrorKind::Config);
    }
}
