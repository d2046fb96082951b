#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("storage: {0}")]
    Storage(#[from] export_api::ExportError),

    #[error("api: {0}")]
    Api(std::io::Error),

    #[error("signal: {0}")]
    Signal(std::io::Error),

    #[error("api task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
