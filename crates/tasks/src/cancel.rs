//! Hierarchical cancellation.
//!
//! A [`CancelToken`] is a cheap, cloneable signal. Cancelling a token cancels
//! every token derived from it with [`CancelToken::child`], but cancelling a
//! child leaves its parent untouched. Long-running loops wait on
//! [`CancelToken::cancelled`] inside `tokio::select!` so they return promptly
//! instead of leaking.

use std::sync::Arc;

use futures::future::select_all;
use tokio::sync::watch;

/// Cancellation signal shared between a task and its owner.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    parent: Option<CancelToken>,
}

impl CancelToken {
    /// Create a new root token.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<CancelToken>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { tx, parent }),
        }
    }

    /// Derive a child token, cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Cancel this token and all of its children.
    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    /// Returns true if this token or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.chain().any(|token| *token.inner.tx.borrow())
    }

    /// Wait until this token or any ancestor is cancelled.
    pub async fn cancelled(&self) {
        let mut receivers: Vec<watch::Receiver<bool>> =
            self.chain().map(|token| token.inner.tx.subscribe()).collect();

        let waits = receivers.iter_mut().map(|rx| {
            Box::pin(async move {
                // The sender lives as long as the token, so this only
                // resolves on cancellation.
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            })
        });

        select_all(waits).await;
    }

    fn chain(&self) -> impl Iterator<Item = &CancelToken> {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.inner.parent.as_ref();
            Some(current)
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .expect("task should not panic");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancels_child() {
        let parent = CancelToken::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.cancel();

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), grandchild.cancelled())
            .await
            .expect("grandchild should observe parent cancellation");
    }

    #[tokio::test]
    async fn test_child_does_not_cancel_parent() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(50), parent.cancelled()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(token.cancelled());
    }
}
