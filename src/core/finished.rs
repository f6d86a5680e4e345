//! Stream of finished task snapshots.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::Task;

/// Receiving end of the finished-task list.
///
/// Yields every task that reached a terminal status, in completion order.
/// The stream ends once the scheduler has shut down and the buffer is
/// drained. It can be taken only once per scheduler.
#[derive(Debug)]
pub struct FinishedTasks<P> {
    rx: mpsc::Receiver<Task<P>>,
}

impl<P> FinishedTasks<P> {
    pub(crate) const fn new(rx: mpsc::Receiver<Task<P>>) -> Self {
        Self { rx }
    }

    /// Wait for the next finished task; `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<Task<P>> {
        self.rx.recv().await
    }

    /// Take a finished task if one is buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<Task<P>> {
        self.rx.try_recv().ok()
    }
}

impl<P> Stream for FinishedTasks<P> {
    type Item = Task<P>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
