// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::semaphore::SemaphoreWatcher;
use crate::event::WaitableEvent;
use crate::policy::ResetPolicy;

/// Slice of each blocking consume attempt; bounds how long a stopped watcher
/// keeps its blocking thread.
const CONSUME_SLICE: Duration = Duration::from_millis(10);

/// Take one signal from an automatic event, giving up once `token` is
/// cancelled. Returns `true` if the signal was consumed.
fn consume_until_cancelled(event: &WaitableEvent, token: &CancellationToken) -> bool {
    while !token.is_cancelled() {
        if event.timed_wait(CONSUME_SLICE) {
            return true;
        }
    }
    false
}

/// Runs a callback once, on a tokio runtime, when an event becomes signaled.
///
/// For automatic-reset events the watcher consumes the signal before
/// invoking the callback, exactly like a successful `wait`. If a synchronous
/// waiter wins the race for that signal the watcher keeps waiting for the
/// next one on a blocking thread.
///
/// Dropping the watcher, or calling [`stop_watching`](Self::stop_watching),
/// cancels it; a callback the watcher task has not reached yet is skipped.
/// Once the watcher has consumed an automatic signal the callback runs even
/// if a stop races with it, so the signal is never swallowed.
pub struct WaitableEventWatcher {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WaitableEventWatcher {
    /// Start watching `event` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start_watching<F>(event: Arc<WaitableEvent>, callback: F) -> Self
    where
        F: FnOnce(&WaitableEvent) + Send + 'static,
    {
        Self::start_watching_on(&Handle::current(), event, callback)
    }

    /// Start watching `event`, running the callback on `runtime`.
    pub fn start_watching_on<F>(runtime: &Handle, event: Arc<WaitableEvent>, callback: F) -> Self
    where
        F: FnOnce(&WaitableEvent) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let sink = SemaphoreWatcher::with_token(cancel.clone());
        event.add_watcher(&sink);

        let token = cancel.clone();
        let task = runtime.spawn(async move {
            if sink.notified().await.is_err() {
                trace!(event = %event.id(), "watcher stopped before signal");
                return;
            }
            if token.is_cancelled() {
                return;
            }
            if event.policy() == ResetPolicy::Automatic && !event.timed_wait(Duration::ZERO) {
                // watchers hear about a signal before the kernel trigger lands,
                // and a synchronous waiter may take it first; either way the
                // permit is spent, so keep consuming from a blocking thread
                let consumer = {
                    let event = Arc::clone(&event);
                    let token = token.clone();
                    tokio::task::spawn_blocking(move || consume_until_cancelled(&event, &token))
                };
                match consumer.await {
                    Ok(true) => {}
                    Ok(false) => {
                        trace!(event = %event.id(), "watcher stopped before consuming signal");
                        return;
                    }
                    Err(err) => {
                        warn!(event = %event.id(), error = %err, "watcher consume task failed");
                        return;
                    }
                }
            }
            // retire the sink so the event prunes it on the next signal
            token.cancel();
            callback(&event);
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop watching. A callback that is already running is not interrupted.
    pub fn stop_watching(&mut self) {
        self.cancel.cancel();
        self.task.take();
    }

    /// `true` until the callback has started or watching was stopped.
    pub fn is_watching(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .task
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for WaitableEventWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
