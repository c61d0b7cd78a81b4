// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Construction-time policy types shared by every backend.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// How a signaled event returns to the non-signaled state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Cleared as part of releasing exactly one waiter.
    Automatic,
    /// Stays signaled until [`reset`](crate::WaitableEvent::reset).
    Manual,
}

impl ResetPolicy {
    /// Whether the kernel entry should clear itself on delivery.
    pub(crate) fn auto_clear(self) -> bool {
        matches!(self, Self::Automatic)
    }
}

/// Signal state an event starts in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    /// Starts signaled, as if [`signal`](crate::WaitableEvent::signal) had
    /// been called right after construction.
    Signaled,
    /// Starts non-signaled.
    NotSignaled,
}

/// Process-unique identifier of a [`WaitableEvent`](crate::WaitableEvent).
///
/// Used by diagnostics instead of the event's address, which changes when
/// the event is moved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(u64);

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

impl EventId {
    pub(crate) fn next() -> Self {
        Self(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the raw identifier.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "WaitableEvent({})", self.0)
    }
}

impl Display for ResetPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}
