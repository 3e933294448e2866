//! Deadline and cancellation for scrape passes.

use std::{future::Future, time::Duration};

use tokio::{sync::watch, time::Instant};

use crate::error::ScrapeError;

/// Context of a scrape pass: its deadline and an optional cancellation signal.
///
/// The context is cheaply cloneable; all clones observe the same cancellation signal.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

impl ScrapeContext {
    /// Creates a context with the specified deadline and no explicit cancellation.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            cancel: None,
        }
    }

    /// Creates a context with the deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Creates a context that can additionally be cancelled using the returned handle.
    pub fn cancellable(deadline: Instant) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let this = Self {
            deadline,
            cancel: Some(receiver),
        };
        (this, CancelHandle(sender))
    }

    /// Returns the deadline of this context.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Checks whether the context is cancelled, either explicitly or because the deadline
    /// has passed.
    pub fn is_cancelled(&self) -> bool {
        Instant::now() >= self.deadline || self.is_cancelled_explicitly()
    }

    fn is_cancelled_explicitly(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let explicit_cancel = async {
            if let Some(cancel) = &self.cancel {
                let mut cancel = cancel.clone();
                let is_cancelled = cancel.wait_for(|&flag| flag).await.is_ok();
                if is_cancelled {
                    return;
                }
            }
            // The handle was dropped without cancelling, so only the deadline remains.
            std::future::pending::<()>().await;
        };

        tokio::select! {
            () = tokio::time::sleep_until(self.deadline) => {}
            () = explicit_cancel => {}
        }
    }

    /// Drives the provided future unless the context is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Cancelled`] if the context is cancelled before the future completes.
    /// In this case, the future is dropped.
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, ScrapeError> {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(ScrapeError::Cancelled),
            output = future => Ok(output),
        }
    }
}

/// Handle allowing to cancel a [`ScrapeContext`] before its deadline.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Cancels the associated context and all its clones.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}
