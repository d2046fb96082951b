use std::future::Future;
use std::pin::Pin;

use crate::ExportError;

/// One-item-at-a-time hand-off to the outbound transport.
///
/// `send` resolves once the consumer has accepted the item (this is the
/// backpressure point) or fails when the consumer is gone. A failure is
/// terminal: the caller must not send again nor query storage afterwards.
pub trait StreamSink<T>: Send {
    fn send(&mut self, item: T) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;
}
