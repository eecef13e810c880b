//! Run-scoped cancellation and deadlines
//!
//! A [`RunContext`] is handed to every network operation. The run holds one
//! root context with the overall deadline; each phase derives a child with
//! its own deadline. Cancelling a parent cancels every child.

use crate::error::{AppError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    // Cancels the token once the last clone is dropped, which also stops the
    // deadline timer task
    _guard: Option<Arc<DropGuard>>,
}

impl RunContext {
    /// A context with no deadline
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            _guard: None,
        }
    }

    /// A context cancelled automatically after `timeout`.
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::armed(CancellationToken::new(), timeout, None)
    }

    /// A child with its own deadline; the parent's deadline still applies
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self::armed(self.token.child_token(), timeout, self.deadline)
    }

    fn armed(token: CancellationToken, timeout: Duration, parent_deadline: Option<Instant>) -> Self {
        let deadline = Instant::now() + timeout;
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });

        let deadline = match parent_deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        Self {
            _guard: Some(Arc::new(token.clone().drop_guard())),
            token,
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this context is cancelled or its deadline passes
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Run a future unless the context is cancelled first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(AppError::timeout("operation cancelled before it started"));
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AppError::timeout("deadline exceeded")),
            result = fut => result,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("cancelled", &self.is_cancelled())
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels() {
        let ctx = RunContext::with_timeout(Duration::from_secs(2));
        assert!(!ctx.is_cancelled());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_timeout_error() {
        let ctx = RunContext::with_timeout(Duration::from_millis(100));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.category(), "TIMEOUT");
    }

    #[tokio::test]
    async fn test_run_completes_before_deadline() {
        let ctx = RunContext::new();
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_reaches_child() {
        let parent = RunContext::with_timeout(Duration::from_secs(60));
        let child = parent.child_with_timeout(Duration::from_secs(30));
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_is_independent() {
        let parent = RunContext::with_timeout(Duration::from_secs(60));
        let child = parent.child_with_timeout(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_capped_by_parent() {
        let parent = RunContext::with_timeout(Duration::from_secs(5));
        let child = parent.child_with_timeout(Duration::from_secs(30));
        let remaining = child.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_dropping_last_clone_cancels_token() {
        let parent = RunContext::new();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        let token = child.token().clone();
        let clone = child.clone();
        drop(child);
        assert!(!token.is_cancelled());
        drop(clone);
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
