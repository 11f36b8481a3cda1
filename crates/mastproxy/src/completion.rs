//! One-shot completion cells for asynchronous call results
//!
//! An async-shape call returns a [`CompletionHandle`] immediately; the
//! dispatcher fulfills it exactly once, with value or failure, from
//! whatever task delivers the reply. Fulfillment from a task other than
//! the creator's is the normal case, not an edge case.

use crate::error::{ProxyError, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Pending result of an asynchronous proxy call.
///
/// Await it to obtain the value or failure. If the remote master never
/// replies the handle stays pending indefinitely; failure detection and
/// retry are the caller's responsibility.
pub struct CompletionHandle<R> {
    rx: oneshot::Receiver<Result<R>>,
}

impl<R> CompletionHandle<R> {
    /// Create a pending handle and its fulfillment side.
    pub(crate) fn pending() -> (Self, Completer<R>) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, Completer { tx })
    }

    /// Create a handle already fulfilled with `result`.
    pub(crate) fn ready(result: Result<R>) -> Self {
        let (handle, completer) = Self::pending();
        completer.fulfill(result);
        handle
    }
}

impl<R> Future for CompletionHandle<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|r| match r {
            Ok(result) => result,
            Err(_) => Err(ProxyError::ChannelClosed),
        })
    }
}

/// Fulfillment side of a [`CompletionHandle`]. Consuming `fulfill`
/// makes double completion unrepresentable.
pub(crate) struct Completer<R> {
    tx: oneshot::Sender<Result<R>>,
}

impl<R> Completer<R> {
    pub(crate) fn fulfill(self, result: Result<R>) {
        // Receiver may have been dropped; nothing to do then.
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fulfilled_from_another_task() {
        let (handle, completer) = CompletionHandle::<String>::pending();

        tokio::spawn(async move {
            completer.fulfill(Ok("done".to_string()));
        });

        assert_eq!(handle.await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_ready_handle() {
        let handle = CompletionHandle::ready(Ok(7u32));
        assert_eq!(handle.await.unwrap(), 7);

        let handle = CompletionHandle::<u32>::ready(Err(ProxyError::ChannelClosed));
        assert!(handle.await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_completer_fails_cleanly() {
        let (handle, completer) = CompletionHandle::<u32>::pending();
        drop(completer);
        assert!(matches!(handle.await, Err(ProxyError::ChannelClosed)));
    }
}
