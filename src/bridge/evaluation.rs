//! Pending evaluation handle.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Evaluation
// ============================================================================

/// Outcome of one queued adapter command.
///
/// Await it to observe the result, or drop it for fire-and-forget; a
/// dropped evaluation that fails is logged by the connection.
#[derive(Debug)]
#[must_use = "drop the evaluation explicitly to ignore its outcome"]
pub struct Evaluation {
    /// Request this evaluation belongs to.
    request_id: RequestId,
    /// `module.methodName` of the command.
    method: &'static str,
    /// Resolved by the connection event loop.
    rx: oneshot::Receiver<Result<Value>>,
}

impl Evaluation {
    /// Creates an evaluation handle and its completion sender.
    pub(crate) fn channel(
        request_id: RequestId,
        method: &'static str,
    ) -> (Self, oneshot::Sender<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request_id,
                method,
                rx,
            },
            tx,
        )
    }

    /// Returns the request ID.
    #[inline]
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the `module.methodName` of the command.
    #[inline]
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Waits for the outcome, giving up after `wait`.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if the outcome does not arrive in time
    /// - Any error the evaluation itself produced
    pub async fn wait_timeout(self, wait: Duration) -> Result<Value> {
        let request_id = self.request_id;
        timeout(wait, self)
            .await
            .map_err(|_| Error::request_timeout(request_id, wait.as_millis() as u64))?
    }
}

impl Future for Evaluation {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolves_with_result() {
        let (evaluation, tx) = Evaluation::channel(RequestId::generate(), "connection.start");
        assert_eq!(evaluation.method(), "connection.start");

        tx.send(Ok(json!(1))).expect("send");
        assert_eq!(evaluation.await.expect("ok"), json!(1));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_connection_closed() {
        let (evaluation, tx) = Evaluation::channel(RequestId::generate(), "hub.invoke");
        drop(tx);
        assert!(matches!(evaluation.await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let id = RequestId::generate();
        let (evaluation, _tx) = Evaluation::channel(id, "hub.invoke");
        let err = evaluation
            .wait_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestTimeout { request_id, .. } if request_id == id));
    }
}
