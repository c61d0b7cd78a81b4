// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Block on several events at once.

use tracing::trace;

use crate::diagnostics::BlockingScope;
use crate::error::{fatal, OrFatal, WaitableError};
use crate::event::WaitableEvent;
use crate::kernel::{KernelMux, SysMux};

/// Block until at least one of `events` is signaled and return its index.
///
/// When several events are ready in the same kernel delivery the lowest
/// index wins. Exactly that event then goes through a regular
/// [`wait`](WaitableEvent::wait), so an automatic event loses its signal and
/// every other event is left untouched.
///
/// No fairness is promised across calls. Passing the same event more than
/// once is allowed but which of its indices is reported is unspecified.
///
/// # Panics
///
/// Panics if `events` is empty or a kernel call fails.
pub fn wait_many(events: &[&WaitableEvent]) -> usize {
    if events.is_empty() {
        fatal(WaitableError::EmptyWaitSet);
    }

    let ready = {
        let ids = events.iter().map(|event| event.id()).collect();
        let idle = events.iter().all(|event| event.is_only_used_while_idle());
        let _scope = BlockingScope::enter(ids, idle);

        // scoped to this call; closed on every exit path
        let mut mux = SysMux::new(events.len()).or_fatal();
        for (index, event) in events.iter().enumerate() {
            mux.watch(event.kernel(), index).or_fatal();
        }
        mux.wait_ready().or_fatal()
    };

    let winner = ready
        .iter()
        .copied()
        .filter(|&index| index < events.len())
        .min()
        .unwrap_or_else(|| fatal(WaitableError::EmptyDelivery { call: "wait_many" }));
    trace!(winner, delivered = ready.len(), "wait_many ready");

    events[winner].wait();
    winner
}

impl WaitableEvent {
    /// See [`wait_many`](crate::wait_many()).
    pub fn wait_many(events: &[&WaitableEvent]) -> usize {
        wait_many(events)
    }
}
