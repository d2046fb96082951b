use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use export_api::{BatchSummary, ExportError, PageRequest, PrototypeFilter, Record, StreamSink};

use crate::error::EngineError;
use crate::pager::Pager;
use crate::tail::Tailer;

// ═══════════════════════════════════════════════════════════════
//  ChannelSink: StreamSink over a bounded mpsc channel
// ═══════════════════════════════════════════════════════════════

/// Sink backed by a bounded channel. `send` waits for free capacity,
/// which is how a slow consumer slows the producer down.
pub struct ChannelSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> ChannelSink<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }
}

impl<T: Send + 'static> StreamSink<T> for ChannelSink<T> {
    fn send(&mut self, item: T) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(async move {
            self.tx
                .send(item)
                .await
                .map_err(|_| ExportError::sink("consumer closed"))
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  SessionStream: consumer end of a spawned tail/page session
// ═══════════════════════════════════════════════════════════════

/// Items of one tail or page session running on its own task.
///
/// Dropping the stream cancels the session, so an idle tail does not
/// keep sleeping after its consumer is gone.
pub struct SessionStream<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<(), EngineError>>>,
}

impl<T> SessionStream<T> {
    /// Next item. `None` once the session has ended (page exhausted,
    /// cancelled or failed; see [`SessionStream::join`]).
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session task and return how it ended.
    pub async fn join(mut self) -> Result<(), EngineError> {
        self.rx.close();
        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl<T> Drop for SessionStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run a tail session on a new task. The returned stream is the lazy,
/// infinite, non-restartable sequence of batches after `cursor`.
pub fn spawn_tail(
    tailer: Arc<Tailer>,
    cursor: i64,
    filter: PrototypeFilter,
    buffer: usize,
    parent: &CancellationToken,
) -> SessionStream<BatchSummary> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let cancel = parent.child_token();
    let task_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        tailer.run(cursor, &filter, &mut sink, &task_cancel).await
    });
    SessionStream { rx, cancel, handle: Some(handle) }
}

/// Run one page request on a new task. The stream ends after at most
/// `request.count` records.
pub fn spawn_page(
    pager: Arc<Pager>,
    request: PageRequest,
    buffer: usize,
    parent: &CancellationToken,
) -> SessionStream<Record> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let cancel = parent.child_token();
    let task_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        pager.page(&request, &mut sink, &task_cancel).await.map(|_| ())
    });
    SessionStream { rx, cancel, handle: Some(handle) }
}
