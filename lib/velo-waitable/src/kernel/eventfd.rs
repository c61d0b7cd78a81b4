// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! `eventfd` + `epoll` backend.
//!
//! The eventfd counter is the triggered flag: non-zero means signaled. A
//! non-semaphore `read` returns the counter and zeroes it in one kernel
//! operation, which is what makes the auto-clear consume atomic when several
//! threads race on the same readiness notification.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Instant;

use tracing::trace;

use super::{expired, timeout_millis, KernelEvent, KernelMux};
use crate::error::{Result, WaitableError};

enum Readiness {
    Ready,
    TimedOut,
    Interrupted,
}

fn cvt(ret: libc::c_int, call: &'static str) -> Result<libc::c_int> {
    if ret < 0 {
        Err(WaitableError::last_os_error(call))
    } else {
        Ok(ret)
    }
}

/// One eventfd acting as a binary trigger.
#[derive(Debug)]
pub(crate) struct EventFd {
    fd: OwnedFd,
    auto_clear: bool,
}

impl EventFd {
    fn poll_readable(&self, timeout: libc::c_int) -> Result<Readiness> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
        // count matches the single entry.
        let n = unsafe { libc::poll(&mut pfd, 1, timeout) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::Interrupted);
            }
            return Err(WaitableError::Kernel {
                call: "poll",
                source: err,
            });
        }
        if n == 0 {
            return Ok(Readiness::TimedOut);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(WaitableError::Kernel {
                call: "poll",
                source: io::Error::from_raw_os_error(libc::EBADF),
            });
        }
        Ok(Readiness::Ready)
    }

    /// Zero the counter. Returns `false` if it was already zero.
    fn consume(&self) -> Result<bool> {
        let mut value: u64 = 0;
        loop {
            // SAFETY: `value` is a live u64 and the length matches it; the fd
            // is owned by `self`.
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    (&mut value as *mut u64).cast(),
                    std::mem::size_of::<u64>(),
                )
            };
            if n >= 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return Ok(false),
                io::ErrorKind::Interrupted => continue,
                _ => {
                    return Err(WaitableError::Kernel {
                        call: "read(eventfd)",
                        source: err,
                    })
                }
            }
        }
    }
}

impl KernelEvent for EventFd {
    fn register(auto_clear: bool) -> Result<Self> {
        // SAFETY: eventfd(2) only takes plain values; the result is checked.
        let raw = cvt(
            unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) },
            "eventfd",
        )?;
        // SAFETY: eventfd returned a fresh descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        trace!(fd = raw, auto_clear, "registered eventfd");
        Ok(Self { fd, auto_clear })
    }

    fn trigger(&self) -> Result<()> {
        let one: u64 = 1;
        loop {
            // SAFETY: `one` is a live u64 and the length matches it; the fd is
            // owned by `self`.
            let n = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    (&one as *const u64).cast(),
                    std::mem::size_of::<u64>(),
                )
            };
            if n >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                // counter saturated: already signaled
                io::ErrorKind::WouldBlock => return Ok(()),
                io::ErrorKind::Interrupted => continue,
                _ => {
                    return Err(WaitableError::Kernel {
                        call: "write(eventfd)",
                        source: err,
                    })
                }
            }
        }
    }

    fn clear(&self) -> Result<()> {
        self.consume().map(|_| ())
    }

    fn is_triggered(&self) -> Result<bool> {
        loop {
            match self.poll_readable(0)? {
                Readiness::Ready => return Ok(true),
                Readiness::TimedOut => return Ok(false),
                Readiness::Interrupted => continue,
            }
        }
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool> {
        loop {
            match self.poll_readable(timeout_millis(deadline))? {
                Readiness::Ready => {
                    if !self.auto_clear || self.consume()? {
                        return Ok(true);
                    }
                    // another waiter took the trigger; keep waiting
                }
                Readiness::Interrupted => {}
                Readiness::TimedOut => {
                    if expired(deadline) {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

/// Scoped epoll instance used by `wait_many`.
#[derive(Debug)]
pub(crate) struct EpollMux {
    epfd: OwnedFd,
    watched: usize,
}

impl KernelMux for EpollMux {
    type Event = EventFd;

    fn new(capacity: usize) -> Result<Self> {
        // SAFETY: epoll_create1(2) only takes flags; the result is checked.
        let raw = cvt(
            unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) },
            "epoll_create1",
        )?;
        // SAFETY: fresh descriptor from epoll_create1.
        let epfd = unsafe { OwnedFd::from_raw_fd(raw) };
        trace!(epfd = raw, capacity, "created wait_many epoll context");
        Ok(Self { epfd, watched: 0 })
    }

    fn watch(&mut self, event: &EventFd, tag: usize) -> Result<()> {
        let mut ev = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLET) as u32,
            u64: tag as u64,
        };
        // SAFETY: both descriptors are owned and open, and `ev` is a valid
        // epoll_event for the duration of the call.
        let ret = unsafe {
            libc::epoll_ctl(
                self.epfd.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                event.fd.as_raw_fd(),
                &mut ev,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                // same event passed twice; the lower index keeps the registration
                trace!(tag, "event already watched by this wait_many call");
                return Ok(());
            }
            return Err(WaitableError::Kernel {
                call: "epoll_ctl",
                source: err,
            });
        }
        self.watched += 1;
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<Vec<usize>> {
        let mut ready = vec![libc::epoll_event { events: 0, u64: 0 }; self.watched.max(1)];
        loop {
            // SAFETY: `ready` is writable for `ready.len()` entries and the
            // length passed matches it.
            let n = unsafe {
                libc::epoll_wait(
                    self.epfd.as_raw_fd(),
                    ready.as_mut_ptr(),
                    ready.len() as libc::c_int,
                    -1,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(WaitableError::Kernel {
                    call: "epoll_wait",
                    source: err,
                });
            }
            if n == 0 {
                return Err(WaitableError::EmptyDelivery { call: "epoll_wait" });
            }
            return Ok(ready
                .iter()
                .take(n as usize)
                .map(|ev| {
                    let tag = ev.u64;
                    tag as usize
                })
                .collect());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn repeated_triggers_collapse_into_one_signal() {
        let event = EventFd::register(true).unwrap();
        event.trigger().unwrap();
        event.trigger().unwrap();
        event.trigger().unwrap();
        assert!(event.wait_until(Some(Instant::now())).unwrap());
        assert!(!event.is_triggered().unwrap());
    }

    #[test]
    fn timed_out_wait_honors_deadline() {
        let event = EventFd::register(false).unwrap();
        let start = Instant::now();
        let deadline = start + Duration::from_millis(20);
        assert!(!event.wait_until(Some(deadline)).unwrap());
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn duplicate_watch_is_tolerated() {
        let event = EventFd::register(false).unwrap();
        event.trigger().unwrap();
        let mut mux = EpollMux::new(2).unwrap();
        mux.watch(&event, 0).unwrap();
        mux.watch(&event, 1).unwrap();
        assert_eq!(mux.wait_ready().unwrap(), vec![0]);
    }
}
