use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use export_engine::TailConfig;
use storage_file::FileStorageConfig;
use storage_memory::MemoryStorageConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "export-server", about = "Incremental batch export service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the export API
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Outbound queue per WS connection, shared by all of its sessions.
    #[serde(default = "default_ws_buffer")]
    pub ws_buffer: usize,
    /// REST page size when the request carries no `count`.
    #[serde(default = "default_page_count")]
    pub page_count: i32,
    #[serde(default)]
    pub tail: TailConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Memory(_) => "memory",
            StorageConfig::File(_) => "file",
        }
    }
}

fn default_api_port() -> u16 {
    9300
}
fn default_ws_buffer() -> usize {
    256
}
fn default_page_count() -> i32 {
    100
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| match e {
                ServerError::Config { context, detail } => {
                    ServerError::Config { context, detail: format!("'{path}': {detail}") }
                }
                other => other,
            })
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::Config { context: "parse", detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        self.tail
            .validate()
            .map_err(|e| ServerError::Config { context: "tail", detail: e.to_string() })?;
        if self.ws_buffer == 0 {
            return Err(ServerError::Config { context: "ws_buffer", detail: "must be > 0".into() });
        }
        if self.page_count < 0 {
            return Err(ServerError::Config {
                context: "page_count",
                detail: format!("must be >= 0, got {}", self.page_count),
            });
        }
        if let StorageConfig::File(file) = &self.storage {
            if file.data_dir.as_os_str().is_empty() {
                return Err(ServerError::Config { context: "storage", detail: "file storage needs data_dir".into() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.api_port, 9300);
        assert_eq!(config.ws_buffer, 256);
        assert_eq!(config.page_count, 100);
        assert_eq!(config.tail, TailConfig::default());
        assert!(matches!(config.storage, StorageConfig::Memory(ref m) if m.fixture.is_none()));
    }

    #[test]
    fn file_storage_section() {
        let config = ServerConfig::parse(
            r#"
            api_port = 9400

            [tail]
            poll_interval_ms = 250
            emit_empty = false

            [storage]
            kind = "file"
            data_dir = "/var/lib/export"
            "#,
        )
        .unwrap();
        assert_eq!(config.api_port, 9400);
        assert_eq!(config.tail.poll_interval_ms, 250);
        assert!(!config.tail.emit_empty);
        assert_eq!(config.storage.kind(), "file");
        match config.storage {
            StorageConfig::File(f) => assert_eq!(f.data_dir, std::path::PathBuf::from("/var/lib/export")),
            other => panic!("unexpected storage: {other:?}"),
        }
    }

    #[test]
    fn memory_fixture() {
        let config = ServerConfig::parse("[storage]\nkind = \"memory\"\nfixture = \"seed.json\"\n").unwrap();
        match config.storage {
            StorageConfig::Memory(m) => assert_eq!(m.fixture.as_deref(), Some(std::path::Path::new("seed.json"))),
            other => panic!("unexpected storage: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_values() {
        for bad in [
            "ws_buffer = 0",
            "page_count = -1",
            "[tail]\npoll_interval_ms = 0",
            "[tail]\nretry_initial_ms = 50\nretry_max_ms = 10",
            "[storage]\nkind = \"file\"\ndata_dir = \"\"",
            "[storage]\nkind = \"file\"",
            "[storage]\nkind = \"clickhouse\"",
        ] {
            assert!(
                matches!(ServerConfig::parse(bad), Err(ServerError::Config { .. })),
                "accepted: {bad}"
            );
        }
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ws_buffer = 0").unwrap();
        let err = ServerConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("config.toml"), "{err}");

        let missing = dir.path().join("missing.toml");
        let err = ServerConfig::load(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ServerError::Config { context: "read", .. }));
    }
}
