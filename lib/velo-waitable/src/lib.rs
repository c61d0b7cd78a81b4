// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

// Public types
mod event;
mod policy;
mod wait_many;

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod watcher;

// Kernel event facility (see kernel/mod.rs for backend selection)
pub(crate) mod kernel;

// ── Re-exports ───────────────────────────────────────────────────────

pub use error::WaitableError;
pub use event::WaitableEvent;
pub use policy::{EventId, InitialState, ResetPolicy};
pub use wait_many::wait_many;
pub use watcher::{AsyncWatcher, SemaphoreWatcher, WaitableEventWatcher};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::testing::CountingWatcher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn new_event(policy: ResetPolicy) -> WaitableEvent {
        WaitableEvent::new(policy, InitialState::NotSignaled)
    }

    #[test]
    fn manual_signal_persists_across_waits() {
        let event = new_event(ResetPolicy::Manual);
        event.signal();
        for _ in 0..10 {
            assert!(event.is_signaled());
            event.wait();
        }
        event.reset();
        assert!(!event.is_signaled());
    }

    #[test]
    fn automatic_signal_releases_exactly_one_wait() {
        let event = Arc::new(new_event(ResetPolicy::Automatic));
        event.signal();
        assert!(event.timed_wait(Duration::ZERO));

        let second = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.timed_wait(Duration::from_millis(50)))
        };
        assert!(!second.join().unwrap());

        let third = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.timed_wait(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        event.signal();
        assert!(third.join().unwrap());
    }

    #[test]
    fn signaled_construction_equals_signal_then_wait() {
        let constructed = WaitableEvent::new(ResetPolicy::Automatic, InitialState::Signaled);
        let later = new_event(ResetPolicy::Automatic);
        later.signal();

        constructed.wait();
        later.wait();
        assert!(!constructed.is_signaled());
        assert!(!later.is_signaled());
    }

    #[test]
    fn zero_timeout_returns_quickly() {
        let event = new_event(ResetPolicy::Automatic);
        let start = Instant::now();
        assert!(!event.timed_wait(Duration::ZERO));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn wait_many_picks_lowest_ready_and_drains_only_it() {
        let a = new_event(ResetPolicy::Automatic);
        let b = new_event(ResetPolicy::Automatic);
        let c = new_event(ResetPolicy::Automatic);
        b.signal();
        c.signal();

        assert_eq!(wait_many(&[&a, &b, &c]), 1);
        assert!(!a.is_signaled());
        assert!(!b.is_signaled());
        assert!(c.is_signaled());

        assert_eq!(wait_many(&[&a, &b, &c]), 2);
        assert!(!c.is_signaled());
    }

    #[test]
    fn watcher_notified_before_waiter_can_destroy_event() {
        for _ in 0..50 {
            let event = Arc::new(new_event(ResetPolicy::Automatic));
            let watcher = Arc::new(CountingWatcher::default());
            event.add_watcher(&watcher);

            let waiter = {
                let event = Arc::clone(&event);
                let watcher = Arc::clone(&watcher);
                thread::spawn(move || {
                    event.wait();
                    // the kernel trigger is the last step of signal, so the
                    // watcher delivery must already be visible here
                    let seen = watcher.hits();
                    drop(event);
                    seen
                })
            };

            event.signal();
            drop(event);
            assert_eq!(waiter.join().unwrap(), 1);
            assert_eq!(watcher.hits(), 1);
        }
    }

    #[test]
    fn watcher_added_after_signal_is_notified() {
        let event = new_event(ResetPolicy::Manual);
        event.signal();
        let watcher = Arc::new(CountingWatcher::default());
        event.add_watcher(&watcher);
        assert_eq!(watcher.hits(), 1);
    }

    #[test]
    fn cancelled_watcher_pruned_others_unaffected() {
        let event = new_event(ResetPolicy::Manual);
        let first = Arc::new(CountingWatcher::default());
        let second = Arc::new(CountingWatcher::default());
        let third = Arc::new(CountingWatcher::default());
        event.add_watcher(&first);
        event.add_watcher(&second);
        event.add_watcher(&third);

        second.cancel();
        event.signal();
        event.signal();

        assert_eq!(first.hits(), 2);
        assert_eq!(second.hits(), 0);
        assert_eq!(third.hits(), 2);
        assert_eq!(event.watcher_count(), 2);
    }

    #[test]
    fn cancel_event_makes_waits_cancellable() {
        let work = Arc::new(new_event(ResetPolicy::Automatic));
        let cancel = Arc::new(new_event(ResetPolicy::Manual));

        let worker = {
            let work = Arc::clone(&work);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                let mut handled = 0;
                loop {
                    match wait_many(&[&cancel, &work]) {
                        0 => return handled,
                        _ => handled += 1,
                    }
                }
            })
        };

        work.signal();
        thread::sleep(Duration::from_millis(20));
        cancel.signal();
        let handled = worker.join().unwrap();
        assert!(handled <= 1);
    }

    #[test]
    fn many_threads_signal_and_wait() {
        let event = Arc::new(new_event(ResetPolicy::Automatic));
        let consumed = Arc::new(AtomicUsize::new(0));
        const ROUNDS: usize = 200;

        let consumer = {
            let event = Arc::clone(&event);
            let consumed = Arc::clone(&consumed);
            thread::spawn(move || {
                while consumed.load(Ordering::SeqCst) < ROUNDS {
                    if event.timed_wait(Duration::from_millis(200)) {
                        consumed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };

        let ack = Arc::new(new_event(ResetPolicy::Automatic));
        for round in 0..ROUNDS {
            event.signal();
            while consumed.load(Ordering::SeqCst) <= round {
                // spin on a short timed wait so the test never hangs
                ack.timed_wait(Duration::from_micros(100));
            }
        }
        consumer.join().unwrap();
        assert_eq!(consumed.load(Ordering::SeqCst), ROUNDS);
    }
}
