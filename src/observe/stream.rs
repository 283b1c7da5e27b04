use super::diff::ChangeBatch;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Subscription to the change batches of one results controller.
///
/// Ends once the controller is disposed (or dropped) and every queued
/// batch has been received.
#[derive(Debug)]
pub struct ChangeStream {
    receiver: mpsc::UnboundedReceiver<ChangeBatch>,
}

impl ChangeStream {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<ChangeBatch>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Waits for the next batch; `None` once the stream has ended.
    pub async fn next_batch(&mut self) -> Option<ChangeBatch> {
        self.receiver.recv().await
    }

    /// Next queued batch, without waiting.
    pub fn try_next_batch(&mut self) -> Option<ChangeBatch> {
        self.receiver.try_recv().ok()
    }

    /// Drains every queued batch.
    pub fn drain(&mut self) -> Vec<ChangeBatch> {
        std::iter::from_fn(|| self.try_next_batch()).collect()
    }
}

impl Stream for ChangeStream {
    type Item = ChangeBatch;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
