pub mod error;
pub mod filter;
pub mod page;
pub mod sink;
pub mod storage;
pub mod types;
pub mod util;

pub use error::{ErrorKind, ExportError};
pub use filter::PrototypeFilter;
pub use page::select_page;
pub use sink::StreamSink;
pub use storage::{BatchStorage, BatchWriter};
pub use types::{Batch, BatchSummary, PageRequest, Record, RecordType};
pub use util::{decode_reference, encode_reference};
