use std::path::PathBuf;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileStorageConfig {
    /// Root directory. One sub-directory per batch:
    ///
    /// ```text
    /// {data_dir}/{number:020}/batch.json     batch metadata, replaced atomically
    /// {data_dir}/{number:020}/records.jsonl  one record per line, append-only
    /// ```
    pub data_dir: PathBuf,
}

// ════════════════════════════════════════════════════════════════
//  File names
// ════════════════════════════════════════════════════════════════

pub(crate) const BATCH_FILE: &str = "batch.json";
pub(crate) const BATCH_TMP_FILE: &str = "batch.json.tmp";
pub(crate) const RECORDS_FILE: &str = "records.jsonl";

pub(crate) fn batch_dir_name(number: i64) -> String {
    format!("{number:020}")
}
