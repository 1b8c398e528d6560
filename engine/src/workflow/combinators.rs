//! Combinator functions for parallel workflow execution
//!
//! These combinators coordinate multiple workflow futures while preserving
//! determinism during replay: futures resolve from the event history, so
//! completion order is history order, never wall-clock order.
//!
//! ```ignore
//! // Run two agents in parallel and wait for both
//! let results = join_all(vec![
//!     ctx.schedule_activity_raw("financial-auditor", json!({})),
//!     ctx.schedule_activity_raw("pipeline-scout", json!({})),
//! ]).await?;
//! ```

use crate::error::Result;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

// ============================================================================
// JoinAll - Wait for all futures to complete
// ============================================================================

/// Future that waits for all inner futures to complete.
///
/// Created by [`join_all`]. Returns `Ok(Vec<T>)` if all futures succeed,
/// or `Err` with the first error encountered.
pub struct JoinAll<F, T>
where
    F: Future<Output = Result<T>>,
{
    futures: Vec<Option<F>>,
    results: Vec<Option<T>>,
}

impl<F, T> Unpin for JoinAll<F, T> where F: Future<Output = Result<T>> + Unpin {}

impl<F, T> JoinAll<F, T>
where
    F: Future<Output = Result<T>> + Unpin,
{
    fn new(futures: Vec<F>) -> Self {
        let len = futures.len();
        Self {
            futures: futures.into_iter().map(Some).collect(),
            results: (0..len).map(|_| None).collect(),
        }
    }
}

impl<F, T> Future for JoinAll<F, T>
where
    F: Future<Output = Result<T>> + Unpin,
{
    type Output = Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut all_done = true;

        for i in 0..this.futures.len() {
            if this.results[i].is_some() {
                continue;
            }

            if let Some(ref mut future) = this.futures[i] {
                match Pin::new(future).poll(cx) {
                    Poll::Ready(Ok(result)) => {
                        this.results[i] = Some(result);
                        this.futures[i] = None;
                    }
                    Poll::Ready(Err(e)) => {
                        return Poll::Ready(Err(e));
                    }
                    Poll::Pending => {
                        all_done = false;
                    }
                }
            }
        }

        if all_done {
            let results: Vec<T> = this
                .results
                .iter_mut()
                .map(|r| r.take().expect("All results should be present"))
                .collect();
            Poll::Ready(Ok(results))
        } else {
            Poll::Pending
        }
    }
}

/// Wait for all futures to complete, returning their results in input order.
///
/// Returns `Ok(Vec<T>)` if all futures succeed, or the first `Err`
/// encountered. Even when some futures are still pending, all of them get
/// polled, so every operation is scheduled before the workflow suspends.
pub fn join_all<F, T>(futures: Vec<F>) -> JoinAll<F, T>
where
    F: Future<Output = Result<T>> + Unpin,
{
    JoinAll::new(futures)
}

// ============================================================================
// Select - Wait for the first future to complete
// ============================================================================

/// Future that waits for the first inner future to complete.
///
/// Created by [`select`]. Returns the index and result of the first future
/// to complete. Other futures are not cancelled - they remain scheduled and
/// complete eventually.
pub struct Select<F, T>
where
    F: Future<Output = Result<T>>,
{
    futures: Vec<Option<F>>,
}

impl<F, T> Unpin for Select<F, T> where F: Future<Output = Result<T>> + Unpin {}

impl<F, T> Select<F, T>
where
    F: Future<Output = Result<T>> + Unpin,
{
    fn new(futures: Vec<F>) -> Self {
        Self {
            futures: futures.into_iter().map(Some).collect(),
        }
    }
}

impl<F, T> Future for Select<F, T>
where
    F: Future<Output = Result<T>> + Unpin,
{
    type Output = Result<(usize, T)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        for i in 0..this.futures.len() {
            if let Some(ref mut future) = this.futures[i] {
                match Pin::new(future).poll(cx) {
                    Poll::Ready(Ok(result)) => {
                        this.futures[i] = None;
                        return Poll::Ready(Ok((i, result)));
                    }
                    Poll::Ready(Err(e)) => {
                        this.futures[i] = None;
                        return Poll::Ready(Err(e));
                    }
                    Poll::Pending => {}
                }
            }
        }

        Poll::Pending
    }
}

/// Wait for the first future to complete, returning its index and result.
///
/// Returns `Ok((index, result))` for the first future that completes
/// successfully, or `Err` if the first completing future fails. On replay
/// "first" means first in history order, which keeps selection replay-stable.
pub fn select<F, T>(futures: Vec<F>) -> Select<F, T>
where
    F: Future<Output = Result<T>> + Unpin,
{
    Select::new(futures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::pin::pin;

    fn ready_ok<T>(value: T) -> impl Future<Output = Result<T>> + Unpin {
        std::future::ready(Ok(value))
    }

    fn ready_err<T>(msg: &str) -> impl Future<Output = Result<T>> + Unpin {
        std::future::ready(Err(EngineError::Other(msg.to_string())))
    }

    fn poll_once<F: Future + Unpin>(future: Pin<&mut F>) -> Poll<F::Output> {
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        F::poll(future, &mut cx)
    }

    #[test]
    fn test_join_all_empty() {
        let futures: Vec<std::future::Ready<Result<i32>>> = vec![];
        let mut future = pin!(join_all(futures));

        match poll_once(future.as_mut()) {
            Poll::Ready(Ok(results)) => assert!(results.is_empty()),
            other => panic!("Expected Ready(Ok([])), got {:?}", other),
        }
    }

    #[test]
    fn test_join_all_preserves_input_order() {
        let futures = vec![ready_ok(10), ready_ok(20), ready_ok(30)];
        let mut future = pin!(join_all(futures));

        match poll_once(future.as_mut()) {
            Poll::Ready(Ok(results)) => assert_eq!(results, vec![10, 20, 30]),
            other => panic!("Expected Ready(Ok([10, 20, 30])), got {:?}", other),
        }
    }

    #[test]
    fn test_join_all_first_error_wins() {
        let futures: Vec<Box<dyn Future<Output = Result<i32>> + Unpin>> = vec![
            Box::new(ready_ok(1)),
            Box::new(ready_err("boom")),
            Box::new(ready_ok(3)),
        ];
        let mut future = pin!(join_all(futures));

        match poll_once(future.as_mut()) {
            Poll::Ready(Err(_)) => {}
            other => panic!("Expected Ready(Err(_)), got {:?}", other),
        }
    }

    #[test]
    fn test_join_all_polls_every_future_before_suspending() {
        // A pending future must not stop the later ones from being polled
        // (scheduling happens at creation, but polling drives side tables)
        struct PendingFuture;
        impl Future for PendingFuture {
            type Output = Result<i32>;
            fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
                Poll::Pending
            }
        }
        impl Unpin for PendingFuture {}

        let futures: Vec<Box<dyn Future<Output = Result<i32>> + Unpin>> = vec![
            Box::new(PendingFuture),
            Box::new(ready_ok(2)),
        ];
        let mut future = pin!(join_all(futures));

        assert!(matches!(poll_once(future.as_mut()), Poll::Pending));
        // Second poll: the ready result was retained, still pending overall
        assert!(matches!(poll_once(future.as_mut()), Poll::Pending));
    }

    #[test]
    fn test_select_returns_first_ready() {
        let futures = vec![ready_ok(1), ready_ok(2)];
        let mut future = pin!(select(futures));

        match poll_once(future.as_mut()) {
            Poll::Ready(Ok((index, value))) => {
                assert_eq!(index, 0);
                assert_eq!(value, 1);
            }
            other => panic!("Expected Ready(Ok((0, 1))), got {:?}", other),
        }
    }

    #[test]
    fn test_select_empty_is_pending() {
        let futures: Vec<std::future::Ready<Result<i32>>> = vec![];
        let mut future = pin!(select(futures));
        assert!(matches!(poll_once(future.as_mut()), Poll::Pending));
    }

    #[test]
    fn test_select_propagates_error() {
        let futures: Vec<Box<dyn Future<Output = Result<i32>> + Unpin>> =
            vec![Box::new(ready_err("boom")), Box::new(ready_ok(2))];
        let mut future = pin!(select(futures));

        match poll_once(future.as_mut()) {
            Poll::Ready(Err(EngineError::Other(msg))) => assert_eq!(msg, "boom"),
            other => panic!("Expected Ready(Err), got {:?}", other),
        }
    }
}
