// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The core [`WaitableEvent`] type.

use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::diagnostics::BlockingScope;
use crate::error::{OrFatal, Result};
use crate::kernel::{self, KernelEvent, SysEvent};
use crate::policy::{EventId, InitialState, ResetPolicy};
use crate::watcher::{AsyncWatcher, SemaphoreWatcher, WatcherList};

/// A binary semaphore backed by one kernel event object.
///
/// Any number of threads may signal, reset or wait on the same event.
/// [`ResetPolicy::Automatic`] events release exactly one waiter per signal;
/// [`ResetPolicy::Manual`] events stay signaled until [`reset`](Self::reset).
///
/// Dropping an event while another thread is blocked on it is a caller bug;
/// share it through an `Arc` and drop it only after every waiter returned.
pub struct WaitableEvent {
    id: EventId,
    policy: ResetPolicy,
    kernel: SysEvent,
    watchers: WatcherList,
    only_used_while_idle: AtomicBool,
}

impl WaitableEvent {
    /// Create an event.
    ///
    /// # Panics
    ///
    /// Panics if the kernel cannot allocate the event object.
    pub fn new(policy: ResetPolicy, initial: InitialState) -> Self {
        Self::try_new(policy, initial).or_fatal()
    }

    /// Create an event, reporting kernel resource exhaustion as an error.
    pub fn try_new(policy: ResetPolicy, initial: InitialState) -> Result<Self> {
        let kernel = SysEvent::register(policy.auto_clear())?;
        let event = Self {
            id: EventId::next(),
            policy,
            kernel,
            watchers: WatcherList::new(),
            only_used_while_idle: AtomicBool::new(false),
        };
        debug!(id = %event.id, %policy, ?initial, "created waitable event");
        if initial == InitialState::Signaled {
            event.signal();
        }
        Ok(event)
    }

    /// Process-unique identifier of this event.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Reset policy chosen at construction.
    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    /// Put the event in the non-signaled state. No-op if not signaled.
    pub fn reset(&self) {
        self.kernel.clear().or_fatal();
    }

    /// Put the event in the signaled state.
    ///
    /// Async watchers are notified first, then the kernel object is
    /// triggered. A synchronous waiter may drop the event as soon as it
    /// wakes, so the trigger has to be the last thing this does.
    pub fn signal(&self) {
        let notified = self.watchers.dispatch();
        trace!(id = %self.id, notified, "signal");
        self.kernel.trigger().or_fatal();
    }

    /// Whether the event is signaled. Never blocks and never consumes the
    /// signal of an automatic event.
    pub fn is_signaled(&self) -> bool {
        self.kernel.is_triggered().or_fatal()
    }

    /// Block until the event is signaled. Consumes the signal of an
    /// automatic event.
    pub fn wait(&self) {
        let signaled = self.wait_deadline(None);
        debug_assert!(signaled, "infinite wait returned unsignaled");
    }

    /// Wait at most `timeout`. Returns `true` if the event was signaled.
    ///
    /// A zero timeout is a single non-blocking check. Timeouts too large to
    /// represent as a deadline wait forever.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        self.wait_deadline(Instant::now().checked_add(timeout))
    }

    /// Wait until `deadline`. Returns `true` if the event was signaled.
    ///
    /// A deadline in the past is a single non-blocking check.
    pub fn timed_wait_until(&self, deadline: Instant) -> bool {
        self.wait_deadline(Some(deadline))
    }

    fn wait_deadline(&self, deadline: Option<Instant>) -> bool {
        let _scope = (!kernel::expired(deadline))
            .then(|| BlockingScope::enter(vec![self.id], self.is_only_used_while_idle()));
        self.kernel.wait_until(deadline).or_fatal()
    }

    /// Mark this event as one that threads wait on while they have nothing
    /// else to do, e.g. a worker's wake-up event. Waits on it are then not
    /// reported as blocked calls in [`diagnostics`](crate::diagnostics).
    pub fn declare_only_used_while_idle(&self) {
        self.only_used_while_idle.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_only_used_while_idle(&self) -> bool {
        self.only_used_while_idle.load(Ordering::Relaxed)
    }

    /// Register an async watcher.
    ///
    /// The event keeps only a weak reference; dropping the last `Arc` or
    /// cancelling the watcher unregisters it lazily. If the event is already
    /// signaled the watcher is notified once right away.
    pub fn add_watcher<W>(&self, watcher: &Arc<W>)
    where
        W: AsyncWatcher + 'static,
    {
        let weak = Arc::downgrade(watcher) as Weak<dyn AsyncWatcher>;
        self.watchers.add(weak, || self.is_signaled());
    }

    /// Register and return a [`SemaphoreWatcher`] for async consumers.
    pub fn watch(&self) -> Arc<SemaphoreWatcher> {
        let watcher = SemaphoreWatcher::new();
        self.add_watcher(&watcher);
        watcher
    }

    /// Registered watchers, including cancelled ones not yet pruned.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    pub(crate) fn kernel(&self) -> &SysEvent {
        &self.kernel
    }
}

impl Debug for WaitableEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitableEvent")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Drop for WaitableEvent {
    fn drop(&mut self) {
        trace!(id = %self.id, "dropping waitable event");
    }
}
