pub mod backoff;
pub mod config;
pub mod error;
pub mod pager;
pub mod request;
pub mod session;
pub mod tail;

pub use backoff::Backoff;
pub use config::TailConfig;
pub use error::EngineError;
pub use pager::Pager;
pub use request::{page_request, parse_filter};
pub use session::{spawn_page, spawn_tail, ChannelSink, SessionStream};
pub use tail::Tailer;
