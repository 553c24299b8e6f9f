//! Result handles: awaitable values that resolve exactly once.

use crate::error::TaskError;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

type Inner<T> = Shared<BoxFuture<'static, Result<T, TaskError>>>;

/// A handle to a pending asynchronous computation.
///
/// A handle resolves exactly once, to either a value or a [`TaskError`].
/// Handles are cheap to clone and every clone observes the same resolution,
/// so one clone can be awaited by the task while another is watched by the
/// step runner for logging. Awaiting a clone taken after resolution completes
/// immediately.
///
/// # Examples
///
/// ```
/// use steptask::ResultHandle;
///
/// # #[tokio::main]
/// # async fn main() {
/// let handle = ResultHandle::spawn(async { Ok(21) });
/// let doubled = handle.clone().map(|n| n * 2);
///
/// assert_eq!(handle.await, Ok(21));
/// assert_eq!(doubled.await, Ok(42));
/// # }
/// ```
pub struct ResultHandle<T> {
    inner: Inner<T>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ResultHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Starts `future` on the current tokio runtime and returns a handle to
    /// its result.
    ///
    /// The work makes progress whether or not anyone awaits the handle.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let join = tokio::spawn(future);
        Self::from_future(async move {
            join.await
                .unwrap_or_else(|e| Err(TaskError::Cancelled(e.to_string())))
        })
    }

    /// Wraps a lazy future. It only makes progress while some clone of the
    /// handle is being awaited.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<T, TaskError>) -> Self {
        Self::from_future(future::ready(result))
    }

    /// Returns the resolution if some clone has already observed it.
    pub fn peek(&self) -> Option<&Result<T, TaskError>> {
        self.inner.peek()
    }

    /// Attaches `f` to run on the resolved value, producing a new handle.
    ///
    /// Failures skip `f` and propagate to the new handle unchanged. Inside
    /// a tokio runtime the returned handle is eager and `f` runs as soon as
    /// `self` resolves; outside one it runs when the new handle is awaited.
    pub fn map<U, F>(self, f: F) -> ResultHandle<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let mapped = async move { self.await.map(f) };
        match tokio::runtime::Handle::try_current() {
            Ok(_) => ResultHandle::spawn(mapped),
            Err(_) => ResultHandle::from_future(mapped),
        }
    }

    /// Combines `handles` into a single handle resolving to every value in
    /// input order, or to the first failure observed.
    pub fn sequence<I>(handles: I) -> ResultHandle<Vec<T>>
    where
        I: IntoIterator<Item = ResultHandle<T>>,
    {
        let handles: Vec<_> = handles.into_iter().collect();
        ResultHandle::from_future(future::try_join_all(handles))
    }
}

impl<T: Clone> Future for ResultHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.poll_unpin(cx)
    }
}

impl<T: Clone> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.peek() {
            None => "pending",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("ResultHandle").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_spawned_handle_resolves_for_every_clone() {
        let handle = ResultHandle::spawn(async { Ok("done".to_string()) });
        let clone = handle.clone();

        assert_eq!(assert_ok!(handle.await), "done");
        assert_eq!(assert_ok!(clone.await), "done");
    }

    #[tokio::test]
    async fn test_clone_after_resolution_completes_immediately() {
        let handle = ResultHandle::ready(Ok(3_u32));
        assert_ok!(handle.clone().await);

        assert_eq!(handle.peek(), Some(&Ok(3)));
        assert_eq!(handle.clone().await, Ok(3));
    }

    #[tokio::test]
    async fn test_map_transforms_value() {
        let (tx, rx) = oneshot::channel::<u32>();
        let handle = ResultHandle::spawn(async move {
            rx.await.map_err(|e| TaskError::Cancelled(e.to_string()))
        });
        let mapped = handle.map(|n| format!("receipt-{}", n));

        assert!(tx.send(9).is_ok());
        assert_eq!(mapped.await, Ok("receipt-9".to_string()));
    }

    #[tokio::test]
    async fn test_map_propagates_failure() {
        let handle: ResultHandle<u32> =
            ResultHandle::ready(Err(TaskError::Purge("denied".to_string())));
        let mapped = handle.map(|n| n + 1);

        let error: TaskError = assert_err!(mapped.await);
        assert_eq!(error, TaskError::Purge("denied".to_string()));
    }

    #[test]
    fn test_map_outside_runtime_runs_on_await() {
        let handle = ResultHandle::ready(Ok(20_u32));
        let mapped = handle.map(|n| n + 1);

        assert_eq!(mapped.peek(), None);
        assert_eq!(futures::executor::block_on(mapped.clone()), Ok(21));
        assert_eq!(mapped.peek(), Some(&Ok(21)));
    }

    #[tokio::test]
    async fn test_panicking_work_resolves_to_cancelled() {
        let handle: ResultHandle<u32> = ResultHandle::spawn(async { panic!("boom") });

        match handle.await {
            Err(TaskError::Cancelled(_)) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sequence_keeps_input_order() {
        let (tx1, rx1) = oneshot::channel::<u32>();
        let (tx2, rx2) = oneshot::channel::<u32>();
        let first = ResultHandle::spawn(async move {
            rx1.await.map_err(|e| TaskError::Cancelled(e.to_string()))
        });
        let second = ResultHandle::spawn(async move {
            rx2.await.map_err(|e| TaskError::Cancelled(e.to_string()))
        });
        let all = ResultHandle::sequence(vec![first, second]);

        assert!(tx2.send(2).is_ok());
        assert!(tx1.send(1).is_ok());
        assert_eq!(all.await, Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_sequence_fails_on_any_failure() {
        let ok = ResultHandle::ready(Ok(1_u32));
        let failed = ResultHandle::ready(Err(TaskError::Purge("timeout".to_string())));

        let error = assert_err!(ResultHandle::sequence(vec![ok, failed]).await);
        assert_eq!(error, TaskError::Purge("timeout".to_string()));
    }

    #[tokio::test]
    async fn test_debug_reports_observed_state() {
        let handle = ResultHandle::ready(Ok(1_u8));
        assert_eq!(format!("{:?}", handle), "ResultHandle { state: \"pending\" }");

        assert_ok!(handle.clone().await);
        assert_eq!(format!("{:?}", handle), "ResultHandle { state: \"succeeded\" }");
    }
}
