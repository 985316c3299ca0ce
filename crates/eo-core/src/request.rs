//! Cancellable futures and pending request tracking

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt};
use tokio::sync::watch;

use crate::error::{DimensionError, DimensionResult};

/// Handle used to cancel a [`CancellableFuture`] from the outside.
///
/// Cancellation is best effort: the flag is always raised, and the wrapped
/// future is dropped only when it was built with
/// [`CancellableFuture::abortable`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// A future carrying its own cancellation handle.
///
/// Once canceled, a successful output is turned into
/// [`DimensionError::Canceled`] so a late result can never be mistaken for a
/// live one.
pub struct CancellableFuture<T> {
    future: BoxFuture<'static, DimensionResult<T>>,
    handle: CancelHandle,
}

impl<T: Send + 'static> CancellableFuture<T> {
    /// Wrap a future that ignores cancellation (it keeps running until it
    /// settles, its output is discarded)
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = DimensionResult<T>> + Send + 'static,
    {
        Self {
            future: future.boxed(),
            handle: CancelHandle::default(),
        }
    }

    /// Wrap a future that is dropped as soon as the request gets canceled
    pub fn abortable<F>(future: F) -> Self
    where
        F: Future<Output = DimensionResult<T>> + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let future = Abortable::new(future, registration)
            .map(|result| result.unwrap_or(Err(DimensionError::Canceled)));
        Self {
            future: future.boxed(),
            handle: CancelHandle {
                canceled: Arc::new(AtomicBool::new(false)),
                abort: Some(abort),
            },
        }
    }

    /// An already resolved request
    pub fn ready(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// An already failed request
    pub fn failed(error: DimensionError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Run `f` on a successful output, keeping the cancel handle
    pub fn on_resolved<F>(self, f: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let Self { future, handle } = self;
        let future = future.inspect(move |result| {
            if let Ok(value) = result {
                f(value);
            }
        });
        Self {
            future: future.boxed(),
            handle,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.handle.is_canceled()
    }
}

impl<T> Future for CancellableFuture<T> {
    type Output = DimensionResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.future.as_mut().poll(cx) {
            Poll::Ready(Ok(_)) if this.handle.is_canceled() => Poll::Ready(Err(DimensionError::Canceled)),
            other => other,
        }
    }
}

/// Settlement state of a request
#[derive(Debug, Clone)]
pub enum RequestStatus<T> {
    Pending,
    Resolved(T),
    Failed(DimensionError),
}

/// An in-flight (or last settled) request, shareable with anyone who needs to
/// await its outcome
#[derive(Debug, Clone)]
pub struct PendingRequest<T> {
    id: u64,
    handle: CancelHandle,
    status: watch::Receiver<RequestStatus<T>>,
}

/// Write side of a [`PendingRequest`]
#[derive(Debug)]
pub struct RequestSettler<T> {
    status: watch::Sender<RequestStatus<T>>,
}

impl<T: Clone> PendingRequest<T> {
    pub fn new(id: u64, handle: CancelHandle) -> (Self, RequestSettler<T>) {
        let (tx, rx) = watch::channel(RequestStatus::Pending);
        (
            Self {
                id,
                handle,
                status: rx,
            },
            RequestSettler { status: tx },
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.status.borrow(), RequestStatus::Pending)
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.handle.is_canceled()
    }

    /// Wait for the request to settle.
    ///
    /// A request whose settler is dropped without settling counts as canceled.
    pub async fn wait(&self) -> DimensionResult<T> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| !matches!(s, RequestStatus::Pending))
            .await;
        match settled {
            Ok(status) => match &*status {
                RequestStatus::Resolved(value) => Ok(value.clone()),
                RequestStatus::Failed(err) => Err(err.clone()),
                RequestStatus::Pending => Err(DimensionError::Canceled),
            },
            Err(_) => Err(DimensionError::Canceled),
        }
    }
}

impl<T> RequestSettler<T> {
    /// Publish the outcome of the request. Only the first outcome is kept.
    pub fn settle(&self, result: DimensionResult<T>) {
        let status = match result {
            Ok(value) => RequestStatus::Resolved(value),
            Err(err) => RequestStatus::Failed(err),
        };
        self.status.send_if_modified(move |current| {
            if matches!(current, RequestStatus::Pending) {
                *current = status;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_canceled_result_is_discarded() {
        let (tx, rx) = oneshot::channel::<u32>();
        let future = CancellableFuture::new(async move { rx.await.map_err(|_| DimensionError::Canceled) });
        future.cancel();
        tx.send(7).unwrap();
        assert_eq!(future.await, Err(DimensionError::Canceled));
    }

    #[tokio::test]
    async fn test_abortable_future_stops_on_cancel() {
        let (_tx, rx) = oneshot::channel::<u32>();
        let future = CancellableFuture::abortable(async move { rx.await.map_err(|_| DimensionError::Canceled) });
        let handle = future.cancel_handle();
        let task = tokio::spawn(future);
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(DimensionError::Canceled));
    }

    #[tokio::test]
    async fn test_pending_request_wait() {
        let (request, settler) = PendingRequest::<u32>::new(1, CancelHandle::default());
        assert!(request.is_pending());
        let waiter = {
            let request = request.clone();
            tokio::spawn(async move { request.wait().await })
        };
        settler.settle(Ok(3));
        assert_eq!(waiter.await.unwrap(), Ok(3));
        assert!(!request.is_pending());
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let (request, settler) = PendingRequest::<u32>::new(1, CancelHandle::default());
        settler.settle(Err(DimensionError::Canceled));
        settler.settle(Ok(5));
        assert_eq!(request.wait().await, Err(DimensionError::Canceled));
    }

    #[tokio::test]
    async fn test_dropped_settler_counts_as_canceled() {
        let (request, settler) = PendingRequest::<u32>::new(1, CancelHandle::default());
        drop(settler);
        assert_eq!(request.wait().await, Err(DimensionError::Canceled));
    }
}
