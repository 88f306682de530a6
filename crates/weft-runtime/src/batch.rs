//! Batch handles and submission ordering

use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use weft_core::{ActionResult, ThreadId};
use weft_tools::BatchExecution;

/// A submitted batch.
///
/// Streams results in completion order; [`BatchRun::collect_ordered`]
/// returns them in request order. Dropping an unfinished run cancels it.
#[derive(Debug)]
pub struct BatchRun {
    thread_id: ThreadId,
    execution: BatchExecution,
}

impl BatchRun {
    pub(crate) fn new(thread_id: ThreadId, execution: BatchExecution) -> Self {
        Self {
            thread_id,
            execution,
        }
    }

    /// Thread the results are recorded on
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn len(&self) -> usize {
        self.execution.len()
    }

    pub fn is_empty(&self) -> bool {
        self.execution.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.execution.completed()
    }

    /// Stop starting new operations and signal running ones
    pub fn cancel(&self) {
        self.execution.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.execution.cancellation_token()
    }

    pub async fn collect_ordered(self) -> Vec<ActionResult> {
        self.execution.collect_ordered().await
    }
}

impl Stream for BatchRun {
    type Item = ActionResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.execution).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.execution.size_hint()
    }
}

type Completion = Shared<BoxFuture<'static, ()>>;

/// First-come, first-served ordering of batches.
///
/// Each batch takes a ticket at submission; its turn starts once every
/// earlier batch has finished or been abandoned.
#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    tail: Mutex<Option<Completion>>,
}

/// Held for the lifetime of a running batch
#[derive(Debug)]
pub(crate) struct BatchTurn {
    _done: oneshot::Sender<()>,
}

impl BatchQueue {
    pub(crate) async fn ticket(&self) -> BoxFuture<'static, BatchTurn> {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let mut tail = self.tail.lock().await;
        let previous = tail.take();

        let earlier = previous.clone();
        let completion = async move {
            if let Some(earlier) = earlier {
                earlier.await;
            }
            let _ = done_rx.await;
        }
        .boxed()
        .shared();
        *tail = Some(completion);

        async move {
            if let Some(previous) = previous {
                previous.await;
            }
            BatchTurn { _done: done_tx }
        }
        .boxed()
    }
}
