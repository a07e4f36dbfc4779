//! Cancellable request context threaded through store and cache calls
//!
//! A context carries an optional cancellation signal and an optional deadline.
//! Operations wrap their in-flight future with [`RequestContext::run`], which
//! drops the future (aborting the underlying call) as soon as either fires.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Marker returned when a context fires before the wrapped call resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Request-scoped cancellation and deadline
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancel_rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Handle used to cancel every context derived from it
#[derive(Debug)]
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl RequestContext {
    /// Context that never cancels and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Context paired with a handle that cancels it
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                cancel_rx: Some(cancel_rx),
                deadline: None,
            },
            CancelHandle { cancel_tx },
        )
    }

    /// Derive a context that also expires after `timeout`
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        let signalled = self
            .cancel_rx
            .as_ref()
            .is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        signalled || expired
    }

    /// Resolves once the context is cancelled or its deadline passes
    ///
    /// Never resolves for a background context. A dropped [`CancelHandle`]
    /// without a prior cancel leaves the context live.
    pub async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_rx.clone();
        let signal = async move {
            match cancel_rx.as_mut() {
                Some(rx) => {
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = signal => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signal.await,
        }
    }

    /// Run `call` unless the context fires first
    ///
    /// The call is not started at all when the context is already cancelled.
    pub async fn run<F, T, E>(&self, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Cancelled>,
    {
        if self.is_cancelled() {
            return Err(Cancelled.into());
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled.into()),
            result = call => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Cancelled,
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    #[tokio::test]
    async fn test_background_context_runs_call() {
        let ctx = RequestContext::background();
        let result: Result<u32, TestError> = ctx.run(async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_pre_cancelled_context_skips_call() {
        let (ctx, handle) = RequestContext::with_cancel();
        handle.cancel();

        let mut started = false;
        let result: Result<(), TestError> = ctx
            .run(async {
                started = true;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert!(!started);
    }

    #[tokio::test]
    async fn test_cancel_mid_call_aborts() {
        let (ctx, handle) = RequestContext::with_cancel();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
            handle
        });

        let result: Result<(), TestError> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert!(canceller.await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(20));

        let result: Result<(), TestError> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_with_timeout_keeps_earlier_deadline() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(10));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline().unwrap(), first);
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = RequestContext::with_cancel();
        drop(handle);

        let result: Result<u8, TestError> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(1)
            })
            .await;
        assert_eq!(result, Ok(1));
    }
}
