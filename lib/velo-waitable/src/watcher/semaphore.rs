// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::AsyncWatcher;

/// Watcher that turns each signal into one semaphore permit.
///
/// Async code awaits [`notified`](Self::notified) to consume a permit; signals
/// that arrive while nobody is waiting accumulate.
pub struct SemaphoreWatcher {
    permits: Semaphore,
    cancel: CancellationToken,
}

impl SemaphoreWatcher {
    /// Create a watcher with its own cancellation token.
    pub fn new() -> Arc<Self> {
        Self::with_token(CancellationToken::new())
    }

    /// Create a watcher cancelled together with `cancel`.
    pub fn with_token(cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            permits: Semaphore::new(0),
            cancel,
        })
    }

    /// Wait for the next notification.
    ///
    /// Fails once the watcher is cancelled, even if permits remain.
    pub async fn notified(&self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => bail!("watcher cancelled"),
            permit = self.permits.acquire() => {
                permit?.forget();
                Ok(())
            }
        }
    }

    /// Consume one pending notification without waiting.
    pub fn try_take(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Notifications delivered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop receiving notifications. The event prunes this watcher on its
    /// next signal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token controlling this watcher.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl AsyncWatcher for SemaphoreWatcher {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn notify(&self) {
        self.permits.add_permits(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifications_accumulate() -> Result<()> {
        let watcher = SemaphoreWatcher::new();
        watcher.notify();
        watcher.notify();
        assert_eq!(watcher.pending(), 2);

        watcher.notified().await?;
        assert!(watcher.try_take());
        assert!(!watcher.try_take());
        Ok(())
    }

    #[tokio::test]
    async fn waiter_wakes_on_notify() -> Result<()> {
        let watcher = SemaphoreWatcher::new();
        let waiter = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.notified().await })
        };

        tokio::task::yield_now().await;
        watcher.notify();
        waiter.await??;
        Ok(())
    }

    #[tokio::test]
    async fn cancel_fails_pending_wait() {
        let watcher = SemaphoreWatcher::new();
        let waiter = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.notified().await })
        };

        tokio::task::yield_now().await;
        watcher.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(watcher.is_cancelled());
    }

    #[tokio::test]
    async fn shared_token_cancels() {
        let token = CancellationToken::new();
        let watcher = SemaphoreWatcher::with_token(token.clone());
        token.cancel();
        assert!(watcher.is_cancelled());
        watcher.notify();
        assert!(watcher.notified().await.is_err());
    }
}
