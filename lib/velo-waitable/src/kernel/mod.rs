// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Kernel event-notification capability.
//!
//! Each [`WaitableEvent`](crate::WaitableEvent) owns one [`KernelEvent`]: a
//! single user-triggerable entry registered with or without auto-clear.
//! [`wait_many`](crate::wait_many) builds a scoped [`KernelMux`] over several
//! of them and blocks until any fires.
//!
//! The backend is selected per platform at compile time:
//! Linux/Android use `eventfd` + `poll`/`epoll`, Apple and BSD use `kqueue`
//! with an `EVFILT_USER` entry.

use std::time::{Duration, Instant};

use crate::error::Result;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod eventfd;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use eventfd::{EpollMux as SysMux, EventFd as SysEvent};

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub(crate) use kqueue::{KqueueMux as SysMux, UserEvent as SysEvent};

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
compile_error!("velo-waitable needs eventfd/epoll or kqueue");

/// One user-triggerable kernel entry.
pub(crate) trait KernelEvent: Send + Sync + Sized {
    /// Allocate a context with one entry. With `auto_clear` a delivered
    /// trigger is consumed by exactly one waiter.
    fn register(auto_clear: bool) -> Result<Self>;

    /// Mark the entry triggered.
    fn trigger(&self) -> Result<()>;

    /// Drop any pending trigger. No-op if not triggered.
    fn clear(&self) -> Result<()>;

    /// Non-blocking, non-consuming check.
    fn is_triggered(&self) -> Result<bool>;

    /// Block until triggered or `deadline` passes (`None` = forever).
    /// Consumes the trigger for auto-clear entries.
    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool>;
}

/// Temporary context that watches several [`KernelEvent`]s at once.
pub(crate) trait KernelMux: Sized {
    type Event: KernelEvent;

    fn new(capacity: usize) -> Result<Self>;

    /// Register `event` edge-triggered, tagged with `tag`.
    fn watch(&mut self, event: &Self::Event, tag: usize) -> Result<()>;

    /// Block until at least one watched entry fires and return the tags of
    /// every entry delivered in that batch.
    fn wait_ready(&mut self) -> Result<Vec<usize>>;
}

/// Time left until `deadline`; `None` means wait forever.
pub(crate) fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

/// `true` once a finite deadline has been reached.
pub(crate) fn expired(deadline: Option<Instant>) -> bool {
    matches!(deadline, Some(deadline) if Instant::now() >= deadline)
}

/// `poll(2)`-style timeout: `-1` for infinite, otherwise the remaining time
/// rounded up to whole milliseconds so a wait never ends early.
#[cfg_attr(
    not(any(target_os = "linux", target_os = "android")),
    allow(dead_code)
)]
pub(crate) fn timeout_millis(deadline: Option<Instant>) -> libc::c_int {
    match remaining(deadline) {
        None => -1,
        Some(left) => {
            let millis = left.as_nanos().div_ceil(1_000_000);
            millis.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn infinite_deadline_maps_to_negative_timeout() {
        assert_eq!(timeout_millis(None), -1);
        assert!(remaining(None).is_none());
        assert!(!expired(None));
    }

    #[test]
    fn past_deadline_is_zero() {
        let past = Instant::now() - Duration::from_millis(5);
        assert_eq!(timeout_millis(Some(past)), 0);
        assert_eq!(remaining(Some(past)), Some(Duration::ZERO));
        assert!(expired(Some(past)));
    }

    #[test]
    fn sub_millisecond_rounds_up() {
        let deadline = Instant::now() + Duration::from_micros(300);
        let timeout = timeout_millis(Some(deadline));
        assert!((0..=1).contains(&timeout));
    }

    #[test]
    fn huge_timeout_is_clamped() {
        let deadline = Instant::now() + Duration::from_secs(60 * 60 * 24 * 365);
        assert_eq!(timeout_millis(Some(deadline)), libc::c_int::MAX);
    }

    #[test]
    fn register_trigger_wait_roundtrip() {
        let event = SysEvent::register(false).unwrap();
        assert!(!event.is_triggered().unwrap());
        event.trigger().unwrap();
        assert!(event.is_triggered().unwrap());
        assert!(event.wait_until(Some(Instant::now())).unwrap());
        // manual entries stay triggered
        assert!(event.is_triggered().unwrap());
        event.clear().unwrap();
        assert!(!event.is_triggered().unwrap());
    }

    #[test]
    fn auto_clear_consumes_once() {
        let event = SysEvent::register(true).unwrap();
        event.trigger().unwrap();
        assert!(event.is_triggered().unwrap());
        assert!(event.wait_until(Some(Instant::now())).unwrap());
        assert!(!event.wait_until(Some(Instant::now())).unwrap());
        assert!(!event.is_triggered().unwrap());
    }

    #[test]
    fn clear_is_idempotent() {
        let event = SysEvent::register(true).unwrap();
        event.clear().unwrap();
        event.clear().unwrap();
        assert!(!event.is_triggered().unwrap());
    }

    #[test]
    fn mux_reports_every_ready_tag() {
        let a = SysEvent::register(true).unwrap();
        let b = SysEvent::register(false).unwrap();
        let c = SysEvent::register(true).unwrap();
        b.trigger().unwrap();
        c.trigger().unwrap();

        let mut mux = SysMux::new(3).unwrap();
        mux.watch(&a, 0).unwrap();
        mux.watch(&b, 1).unwrap();
        mux.watch(&c, 2).unwrap();

        let mut ready = mux.wait_ready().unwrap();
        ready.sort_unstable();
        assert_eq!(ready, vec![1, 2]);

        // the mux only observes readiness; the entries keep their triggers
        assert!(b.is_triggered().unwrap());
        assert!(c.is_triggered().unwrap());
        assert!(!a.is_triggered().unwrap());
    }

    #[test]
    fn concurrent_checks_do_not_disturb_auto_clear_entry() {
        let event = Arc::new(SysEvent::register(true).unwrap());
        let stop = Arc::new(AtomicBool::new(false));

        let checker = {
            let event = Arc::clone(&event);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    event.is_triggered().unwrap();
                }
            })
        };

        for _ in 0..2_000 {
            event.trigger().unwrap();
            // a check on another thread must never hide the trigger
            assert!(event.wait_until(Some(Instant::now())).unwrap());

            event.trigger().unwrap();
            event.clear().unwrap();
            // nor bring it back after a clear
            assert!(!event.is_triggered().unwrap());
        }

        stop.store(true, Ordering::Relaxed);
        checker.join().unwrap();
    }
}
