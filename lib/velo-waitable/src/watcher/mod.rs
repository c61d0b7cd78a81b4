// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous watcher fan-out.
//!
//! Besides waking synchronous waiters, every
//! [`signal`](crate::WaitableEvent::signal) delivers one notification to each
//! registered [`AsyncWatcher`]. The event only tracks interest: it holds
//! `Weak` references, so a watcher that is dropped is treated the same as one
//! that reports itself cancelled and is pruned on the next pass.

mod callback;
mod semaphore;

pub use callback::WaitableEventWatcher;
pub use semaphore::SemaphoreWatcher;

use parking_lot::Mutex as ParkingMutex;
use std::sync::Weak;
use tracing::trace;

/// A cooperatively-cancellable notification sink.
///
/// `notify` runs while the event's watcher list is locked; it must not call
/// back into [`add_watcher`](crate::WaitableEvent::add_watcher) or
/// [`signal`](crate::WaitableEvent::signal) on the same event, and should
/// return promptly.
pub trait AsyncWatcher: Send + Sync {
    /// Once this returns `true` the watcher is removed and never notified
    /// again.
    fn is_cancelled(&self) -> bool;

    /// Deliver one notification unit.
    fn notify(&self);
}

/// Per-event list of registered watchers.
pub(crate) struct WatcherList {
    watchers: ParkingMutex<Vec<Weak<dyn AsyncWatcher>>>,
}

impl WatcherList {
    pub(crate) fn new() -> Self {
        Self {
            watchers: ParkingMutex::new(Vec::new()),
        }
    }

    /// Append `watcher`. If `signaled()` reports the event already signaled,
    /// the new watcher gets one notification right away so it cannot miss a
    /// signal that raced with its registration.
    pub(crate) fn add(&self, watcher: Weak<dyn AsyncWatcher>, signaled: impl FnOnce() -> bool) {
        let mut watchers = self.watchers.lock();
        watchers.push(Weak::clone(&watcher));
        if signaled() {
            if let Some(watcher) = watcher.upgrade() {
                if !watcher.is_cancelled() {
                    watcher.notify();
                }
            }
        }
    }

    /// Notify every live watcher once and drop the cancelled or dead ones.
    /// Returns the number notified.
    pub(crate) fn dispatch(&self) -> usize {
        let mut watchers = self.watchers.lock();
        let before = watchers.len();
        let mut notified = 0;
        watchers.retain(|weak| match weak.upgrade() {
            Some(watcher) if !watcher.is_cancelled() => {
                watcher.notify();
                notified += 1;
                true
            }
            _ => false,
        });
        let pruned = before - watchers.len();
        if pruned > 0 {
            trace!(pruned, remaining = watchers.len(), "pruned async watchers");
        }
        notified
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.lock().len()
    }
}
