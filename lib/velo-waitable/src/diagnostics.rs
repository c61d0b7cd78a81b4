// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Hang diagnosis: which thread is blocked on which event, since when.
//!
//! Every blocking wait holds a [`BlockingScope`] for its duration. The scope
//! enters a `waitable_event.wait` tracing span and, when
//! [`track_blocking_calls`](crate::config::WaitableConfig::track_blocking_calls)
//! is on, publishes a [`BlockedWait`] record that tooling can snapshot with
//! [`blocked_waits`]. None of this influences the wait itself.

use std::sync::LazyLock;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::span::EnteredSpan;
use tracing::{trace_span, warn};

use crate::config;
use crate::policy::EventId;

static BLOCKED: LazyLock<DashMap<ThreadId, BlockedWait>> = LazyLock::new(DashMap::new);

/// A thread currently blocked in a waitable event wait.
#[derive(Clone, Debug)]
pub struct BlockedWait {
    /// The blocked thread.
    pub thread: ThreadId,
    /// Its name, if it has one.
    pub thread_name: Option<String>,
    /// The events it is waiting on; more than one for `wait_many`.
    pub events: Vec<EventId>,
    /// When the wait started.
    pub since: Instant,
}

impl BlockedWait {
    /// How long the thread has been blocked so far.
    pub fn elapsed(&self) -> Duration {
        self.since.elapsed()
    }
}

/// Snapshot of every tracked blocking wait in the process.
pub fn blocked_waits() -> Vec<BlockedWait> {
    BLOCKED.iter().map(|entry| entry.value().clone()).collect()
}

/// RAII marker for one blocking call.
pub(crate) struct BlockingScope {
    thread: ThreadId,
    recorded: bool,
    started: Instant,
    events: Vec<EventId>,
    _span: EnteredSpan,
}

impl BlockingScope {
    /// Mark the current thread as blocked on `events`.
    ///
    /// `idle` waits (events declared only used while idle) get the span but
    /// are never published.
    pub(crate) fn enter(events: Vec<EventId>, idle: bool) -> Self {
        let span = trace_span!("waitable_event.wait", events = ?events).entered();
        let current = thread::current();
        let started = Instant::now();
        let recorded = !idle && config::current().track_blocking_calls;
        if recorded {
            BLOCKED.insert(
                current.id(),
                BlockedWait {
                    thread: current.id(),
                    thread_name: current.name().map(str::to_owned),
                    events: events.clone(),
                    since: started,
                },
            );
        }
        Self {
            thread: current.id(),
            recorded,
            started,
            events,
            _span: span,
        }
    }
}

impl Drop for BlockingScope {
    fn drop(&mut self) {
        if self.recorded {
            BLOCKED.remove(&self.thread);
        }
        if let Some(threshold_ms) = config::current().slow_wait_warn_ms {
            let elapsed = self.started.elapsed();
            if elapsed >= Duration::from_millis(threshold_ms) {
                warn!(
                    events = ?self.events,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow blocking wait on waitable event"
                );
            }
        }
    }
}
