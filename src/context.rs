//! Cancellation and deadline propagation.
//!
//! Every network operation in this crate takes a `&Context`. A context is cheap to clone; clones share the
//! same cancellation state. Child contexts created with [`Context::with_timeout`] or [`Context::with_cancel`]
//! are cancelled together with their parent but can be cancelled on their own without affecting it.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl Default for Context {
    fn default() -> Self {
        Self { token: CancellationToken::new(), deadline: None, timeout: None }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, deadline) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => child.or(parent),
        };
        Self { token: self.token.child_token(), deadline, timeout: Some(timeout) }
    }

    pub fn with_cancel(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline, timeout: self.timeout }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The timeout this context was created with, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Reports why the context is done, or `None` while it is still live. Cancellation wins over an elapsed
    /// deadline.
    pub fn done(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drives `fut` until it completes or the context is done, whichever comes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(reason) = self.done() {
            return Err(reason);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ContextError::Cancelled),
            _ = deadline => Err(ContextError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        self.run(tokio::time::sleep(duration)).await
    }
}
