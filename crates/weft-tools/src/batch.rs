//! Lazily consumed batch results

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use weft_core::ActionResult;

/// Results of one scheduled batch.
///
/// As a [`Stream`] it yields results in completion order. Whatever has been
/// yielded is remembered, so [`BatchExecution::collect_ordered`] can still
/// return the full batch in request order afterwards. Dropping an unfinished
/// execution cancels the batch.
#[derive(Debug)]
pub struct BatchExecution {
    receiver: mpsc::UnboundedReceiver<(usize, ActionResult)>,
    emitted: Vec<(usize, ActionResult)>,
    cancel: CancellationToken,
    len: usize,
    finished: bool,
}

impl BatchExecution {
    /// Wrap a channel of `(request index, result)` pairs. The batch counts
    /// as finished once every sender is gone.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<(usize, ActionResult)>,
        cancel: CancellationToken,
        len: usize,
    ) -> Self {
        Self {
            receiver,
            emitted: Vec::with_capacity(len),
            cancel,
            len,
            finished: false,
        }
    }

    /// Number of requests in the batch
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Results yielded so far
    pub fn completed(&self) -> usize {
        self.emitted.len()
    }

    /// Signal cancellation to every operation of the batch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next result in completion order, with its request index
    pub async fn next_indexed(&mut self) -> Option<(usize, ActionResult)> {
        match self.receiver.recv().await {
            Some((index, result)) => {
                self.emitted.push((index, result.clone()));
                Some((index, result))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Drain the batch and return every result in original request order.
    pub async fn collect_ordered(mut self) -> Vec<ActionResult> {
        while let Some((index, result)) = self.receiver.recv().await {
            self.emitted.push((index, result));
        }
        self.finished = true;

        let mut emitted = std::mem::take(&mut self.emitted);
        emitted.sort_by_key(|(index, _)| *index);
        emitted.into_iter().map(|(_, result)| result).collect()
    }
}

impl Stream for BatchExecution {
    type Item = ActionResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some((index, result))) => {
                self.emitted.push((index, result.clone()));
                Poll::Ready(Some(result))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len.saturating_sub(self.emitted.len());
        (0, Some(remaining))
    }
}

impl Drop for BatchExecution {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}
