// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types for waitable events.
//!
//! Almost every failure in this crate is unrecoverable: a kernel call that
//! should not fail did, or a caller broke a precondition. Those paths go
//! through [`fatal`], which logs and panics. The only fallible public entry
//! point is [`WaitableEvent::try_new`](crate::WaitableEvent::try_new).

use std::io;

use thiserror::Error;

/// Errors that can occur while driving the kernel event facility.
#[derive(Debug, Error)]
pub enum WaitableError {
    /// A kernel call returned an error that is not a timeout.
    #[error("{call} failed: {source}")]
    Kernel {
        /// Name of the failing system call.
        call: &'static str,
        /// The OS error reported by the call.
        #[source]
        source: io::Error,
    },

    /// `wait_many` was called with no events.
    #[error("wait_many requires at least one event")]
    EmptyWaitSet,

    /// A blocking multiplexer wait returned without delivering any entry.
    #[error("{call} returned without delivering any ready entry")]
    EmptyDelivery {
        /// Name of the multiplexer wait call.
        call: &'static str,
    },
}

impl WaitableError {
    /// Capture `errno` for the named call.
    pub(crate) fn last_os_error(call: &'static str) -> Self {
        Self::Kernel {
            call,
            source: io::Error::last_os_error(),
        }
    }

    /// Returns the failing kernel call, if this is a kernel error.
    pub fn kernel_call(&self) -> Option<&'static str> {
        match self {
            Self::Kernel { call, .. } => Some(call),
            Self::EmptyDelivery { call } => Some(call),
            Self::EmptyWaitSet => None,
        }
    }
}

/// Result alias for kernel-level operations.
pub type Result<T> = std::result::Result<T, WaitableError>;

/// Log `err` and stop.
///
/// The primitive is foundational infrastructure; there is nothing a caller
/// could do with a failed `kevent`/`epoll_wait` besides crash with context.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: WaitableError) -> ! {
    tracing::error!(error = %err, "unrecoverable waitable event failure");
    panic!("{err}")
}

/// Unwrap a kernel result, escalating errors through [`fatal`].
pub(crate) trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for Result<T> {
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }
}
