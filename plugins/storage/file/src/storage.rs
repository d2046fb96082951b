use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncWriteExt;

use export_api::{
    select_page, Batch, BatchStorage, BatchSummary, BatchWriter, ExportError, PageRequest,
    PrototypeFilter, Record,
};

use super::config::{batch_dir_name, FileStorageConfig, BATCH_FILE, BATCH_TMP_FILE, RECORDS_FILE};

// ════════════════════════════════════════════════════════════════
//  FileStorage
// ════════════════════════════════════════════════════════════════

/// Durable batch store over a directory tree.
///
/// Missing directories or files read as "no data". Anything else that
/// goes wrong on read is an `Io` or `Format` error.
#[derive(Debug, Clone)]
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(config: &FileStorageConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
        }
    }

    fn batch_dir(&self, number: i64) -> PathBuf {
        self.data_dir.join(batch_dir_name(number))
    }

    // ── Read ──

    /// Batch numbers present on disk, ascending.
    async fn batch_numbers(&self) -> Result<Vec<i64>, ExportError> {
        let mut dir = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ExportError::io(format!("read_dir {}: {e}", self.data_dir.display()))),
        };

        let mut numbers = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| ExportError::io(format!("read_dir {}: {e}", self.data_dir.display())))?
        {
            let name = entry.file_name();
            if let Some(number) = name.to_str().and_then(|s| s.parse::<i64>().ok()) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    async fn read_batch(&self, number: i64) -> Result<Option<Batch>, ExportError> {
        let path = self.batch_dir(number).join(BATCH_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ExportError::io(format!("read {}: {e}", path.display()))),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ExportError::format_err(format!("parse {}: {e}", path.display())))
    }

    /// All records of a batch in file order. A trailing line without a
    /// newline is an append still in progress and is ignored.
    async fn read_records(&self, number: i64) -> Result<Vec<Record>, ExportError> {
        let path = self.batch_dir(number).join(RECORDS_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ExportError::io(format!("read {}: {e}", path.display()))),
        };

        let complete = match content.rfind('\n') {
            Some(end) => &content[..end],
            None => "",
        };

        let mut records = Vec::new();
        for (i, line) in complete.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| {
                ExportError::format_err(format!("parse {} line {}: {e}", path.display(), i + 1))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    async fn do_next_complete_batch(
        &self,
        after: i64,
        filter: &PrototypeFilter,
    ) -> Result<Option<BatchSummary>, ExportError> {
        for number in self.batch_numbers().await? {
            if number <= after {
                continue;
            }
            let Some(batch) = self.read_batch(number).await? else {
                continue;
            };
            if !batch.is_complete {
                continue;
            }
            let records = self.read_records(number).await?;
            return Ok(Some(BatchSummary {
                number: batch.number,
                prev_number: batch.prev_number,
                match_count: filter.count(&records),
            }));
        }
        Ok(None)
    }

    // ── Write ──

    async fn do_put_batch(&self, batch: &Batch) -> Result<(), ExportError> {
        let dir = self.batch_dir(batch.number);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ExportError::io(format!("mkdir {}: {e}", dir.display())))?;

        let json = serde_json::to_vec(batch)?;
        let tmp = dir.join(BATCH_TMP_FILE);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ExportError::io(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, dir.join(BATCH_FILE))
            .await
            .map_err(|e| ExportError::io(format!("rename {}: {e}", tmp.display())))
    }

    async fn do_put_records(&self, records: &[Record]) -> Result<(), ExportError> {
        let mut by_batch: BTreeMap<i64, Vec<&Record>> = BTreeMap::new();
        for record in records {
            by_batch.entry(record.batch_number).or_default().push(record);
        }

        // Every batch of the call is checked before anything is written.
        let mut pending = Vec::with_capacity(by_batch.len());
        for (number, batch_records) in by_batch {
            let mut orders: HashSet<i32> =
                self.read_records(number).await?.iter().map(|r| r.order).collect();
            let mut buf = Vec::new();
            for record in batch_records {
                if !orders.insert(record.order) {
                    return Err(ExportError::new(format!(
                        "batch {number}: duplicate record order {}",
                        record.order
                    )));
                }
                serde_json::to_writer(&mut buf, record)?;
                buf.push(b'\n');
            }
            pending.push((number, buf));
        }

        for (number, buf) in pending {
            let dir = self.batch_dir(number);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ExportError::io(format!("mkdir {}: {e}", dir.display())))?;
            let path = dir.join(RECORDS_FILE);
            drop_torn_tail(&path).await?;
            let mut f = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| ExportError::io(format!("open {}: {e}", path.display())))?;
            f.write_all(&buf)
                .await
                .map_err(|e| ExportError::io(format!("write {}: {e}", path.display())))?;
            f.flush()
                .await
                .map_err(|e| ExportError::io(format!("flush {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// Cut an interrupted append (bytes after the last `\n`) so the next
/// append starts on a fresh line.
async fn drop_torn_tail(path: &Path) -> Result<(), ExportError> {
    let content = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ExportError::io(format!("read {}: {e}", path.display()))),
    };
    if content.last().is_none_or(|b| *b == b'\n') {
        return Ok(());
    }

    let keep = content.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    tracing::warn!(
        path = %path.display(),
        dropped = content.len() - keep,
        "truncating partial record line"
    );
    let f = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| ExportError::io(format!("open {}: {e}", path.display())))?;
    f.set_len(keep as u64)
        .await
        .map_err(|e| ExportError::io(format!("truncate {}: {e}", path.display())))
}

// ════════════════════════════════════════════════════════════════
//  Trait impls
// ════════════════════════════════════════════════════════════════

impl BatchStorage for FileStorage {
    fn next_complete_batch(
        &self,
        after: i64,
        filter: &PrototypeFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BatchSummary>, ExportError>> + Send + '_>> {
        let filter = filter.clone();
        Box::pin(async move { self.do_next_complete_batch(after, &filter).await })
    }

    fn records_page(
        &self,
        request: &PageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, ExportError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move {
            if request.count == 0 {
                return Ok(Vec::new());
            }
            let records = self.read_records(request.batch_number).await?;
            Ok(select_page(records, &request.filter, request.start_order, request.count))
        })
    }
}

impl BatchWriter for FileStorage {
    fn put_batch(&self, batch: Batch) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(async move { self.do_put_batch(&batch).await })
    }

    fn put_records(&self, records: &[Record]) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        let records = records.to_vec();
        Box::pin(async move { self.do_put_records(&records).await })
    }
}

#[cfg(test)]
mod tests {
    use export_api::{ErrorKind, RecordType};

    use super::*;

    fn storage(dir: &Path) -> FileStorage {
        FileStorage::new(&FileStorageConfig { data_dir: dir.to_path_buf() })
    }

    fn record(batch_number: i64, order: i32) -> Record {
        Record {
            reference: vec![order as u8],
            record_type: RecordType::Result,
            object_reference: vec![2],
            prototype_reference: b"P".to_vec(),
            payload: b"{}".to_vec(),
            prev_record_reference: Vec::new(),
            hash: vec![0xaa],
            batch_number,
            order,
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn missing_data_dir_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(&dir.path().join("absent"));
        assert_eq!(store.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap(), None);
        let page = store.records_page(&PageRequest::new(1, PrototypeFilter::all(), 0, 5)).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn corrupt_metadata_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        let batch_dir = dir.path().join(batch_dir_name(10));
        std::fs::create_dir_all(&batch_dir).unwrap();
        std::fs::write(batch_dir.join(BATCH_FILE), "{not json").unwrap();

        let err = store.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn ignores_partial_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        store.put_records(&[record(10, 0)]).await.unwrap();

        let path = dir.path().join(batch_dir_name(10)).join(RECORDS_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(r#"{"reference":"AQ","ty"#);
        std::fs::write(&path, content).unwrap();

        let page = store.records_page(&PageRequest::new(10, PrototypeFilter::all(), 0, 10)).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn append_after_partial_line_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        store.put_batch(Batch {
            number: 10,
            prev_number: 0,
            is_complete: true,
            is_sequential: true,
            timestamp: 0,
            record_count: 2,
        })
        .await
        .unwrap();
        store.put_records(&[record(10, 0)]).await.unwrap();

        let path = dir.path().join(batch_dir_name(10)).join(RECORDS_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(r#"{"reference":"AQ","ty"#);
        std::fs::write(&path, content).unwrap();

        store.put_records(&[record(10, 1)]).await.unwrap();

        let page = store.records_page(&PageRequest::new(10, PrototypeFilter::all(), 0, 10)).await.unwrap();
        assert_eq!(page.iter().map(|r| r.order).collect::<Vec<_>>(), vec![0, 1]);
        let found = store.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap();
        assert_eq!(found.map(|b| b.match_count), Some(2));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[tokio::test]
    async fn rejected_call_writes_no_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        store.put_records(&[record(20, 0)]).await.unwrap();

        assert!(store.put_records(&[record(10, 0), record(20, 0)]).await.is_err());
        let page = store.records_page(&PageRequest::new(10, PrototypeFilter::all(), 0, 10)).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn metadata_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Batch {
            number: 30,
            prev_number: 20,
            is_complete: true,
            is_sequential: true,
            timestamp: 5,
            record_count: 1,
        };
        storage(dir.path()).put_batch(batch).await.unwrap();
        storage(dir.path()).put_records(&[record(30, 0)]).await.unwrap();

        let reopened = storage(dir.path());
        let found = reopened.next_complete_batch(20, &PrototypeFilter::all()).await.unwrap();
        assert_eq!(found, Some(BatchSummary { number: 30, prev_number: 20, match_count: 1 }));
        assert!(!dir.path().join(batch_dir_name(30)).join(BATCH_TMP_FILE).exists());
    }

    #[tokio::test]
    async fn rejects_duplicate_order_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        store.put_records(&[record(10, 0), record(10, 1)]).await.unwrap();
        let err = store.put_records(&[record(10, 1)]).await.unwrap_err();
        assert!(err.message().contains("duplicate record order 1"));
    }

    #[tokio::test]
    async fn ignores_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "not a batch").unwrap();
        let store = storage(dir.path());
        assert_eq!(store.next_complete_batch(0, &PrototypeFilter::all()).await.unwrap(), None);
    }
}
