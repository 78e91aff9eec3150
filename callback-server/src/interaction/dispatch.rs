//! Deadline-bound dispatch of interactions to the injected handler.
//!
//! Slack drops a callback that is not answered within 3 seconds, so the
//! handler gets a fixed budget (2.5 s by default). When the budget runs out
//! the handler future is dropped and the request is answered from the
//! timeout, never from whatever the handler would have returned later.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{error::Elapsed, Instant};

use super::types::Callback;

/// Errors returned by an interaction handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("interaction handling was cancelled")]
    Cancelled,

    #[error("interaction handling exceeded its deadline")]
    DeadlineExceeded,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Cancellation and deadline failures are transient: Slack may retry
    /// them. Everything else is a failure of the handler itself.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => true,
            Self::Internal(err) => err.chain().any(|cause| {
                cause.is::<Elapsed>()
                    || cause
                        .downcast_ref::<HandlerError>()
                        .is_some_and(HandlerError::is_transient)
            }),
        }
    }
}

/// Request-scoped context handed to the handler.
///
/// Cancelled when the deadline passes, when the handler returns, or when the
/// request itself goes away. Handlers that spawn work should race it against
/// [`DispatchContext::cancelled`] or wrap it in [`DispatchContext::run`].
#[derive(Debug, Clone)]
pub struct DispatchContext {
    deadline: Instant,
    cancel: watch::Receiver<bool>,
}

impl DispatchContext {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        // A closed channel means the dispatch scope is gone.
        let _ = cancel.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` until it completes, the deadline passes or the context is
    /// cancelled, whichever comes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, HandlerError> {
        tokio::select! {
            biased;
            output = fut => Ok(output),
            _ = tokio::time::sleep_until(self.deadline) => Err(HandlerError::DeadlineExceeded),
            _ = self.cancelled() => Err(if Instant::now() >= self.deadline {
                HandlerError::DeadlineExceeded
            } else {
                HandlerError::Cancelled
            }),
        }
    }
}

/// Business logic invoked for every verified interaction.
#[async_trait]
pub trait CallbackHandler: Send + Sync + 'static {
    async fn on_callback(
        &self,
        ctx: DispatchContext,
        callback: Callback,
    ) -> Result<(), HandlerError>;
}

/// Handler backed by an async function or closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Build a [`CallbackHandler`] from an async function.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(DispatchContext, Callback) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> CallbackHandler for HandlerFn<F>
where
    F: Fn(DispatchContext, Callback) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_callback(
        &self,
        ctx: DispatchContext,
        callback: Callback,
    ) -> Result<(), HandlerError> {
        (self.f)(ctx, callback).await
    }
}

/// How a dispatch ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed,
    /// Deadline or cancellation; retryable
    Transient(HandlerError),
    /// Handler failure; not retryable without backoff
    Internal(HandlerError),
}

impl DispatchOutcome {
    fn classify(result: Result<(), HandlerError>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(err) if err.is_transient() => Self::Transient(err),
            Err(err) => Self::Internal(err),
        }
    }
}

/// Runs the handler under a per-request deadline.
pub struct Dispatcher<H> {
    handler: H,
    deadline: Duration,
}

impl<H: CallbackHandler> Dispatcher<H> {
    pub fn new(handler: H, deadline: Duration) -> Self {
        Self { handler, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Dispatch with the full budget starting now.
    pub async fn dispatch(&self, callback: Callback) -> DispatchOutcome {
        self.dispatch_until(Instant::now() + self.deadline, callback).await
    }

    /// Dispatch against a deadline the caller fixed earlier, usually when the
    /// request arrived. Time already spent reading the body is not refunded.
    pub async fn dispatch_until(&self, deadline: Instant, callback: Callback) -> DispatchOutcome {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        // Fires on every exit path, including the request future being dropped.
        let _cancel = CancelOnDrop(cancel_tx);

        let ctx = DispatchContext {
            deadline,
            cancel: cancel_rx,
        };

        let result = tokio::time::timeout_at(deadline, self.handler.on_callback(ctx, callback))
            .await
            .unwrap_or(Err(HandlerError::DeadlineExceeded));

        DispatchOutcome::classify(result)
    }
}

struct CancelOnDrop(watch::Sender<bool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}
