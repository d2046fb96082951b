use export_api::ExportError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config: {0}")]
    Config(String),

    /// Rejected at the boundary, before any storage access.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage failure while paging. The tail loop never returns this.
    #[error("storage: {0}")]
    Storage(ExportError),

    /// Consumer went away; terminal for the session.
    #[error("sink: {0}")]
    Sink(ExportError),

    #[error("session task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
