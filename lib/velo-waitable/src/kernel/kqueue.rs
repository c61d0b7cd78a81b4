// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! `kqueue` backend.
//!
//! Every event owns a private kqueue holding one `EVFILT_USER` knote.
//! Auto-reset events register it with `EV_CLEAR`, so the retrieval that
//! wakes a waiter also resets the knote. A kqueue descriptor is readable
//! while it has pending knotes: `is_triggered` polls it for that without
//! retrieving anything, and `wait_many` watches the private descriptors
//! with `EVFILT_READ`.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Instant;

use tracing::trace;

use super::{expired, remaining, KernelEvent, KernelMux};
use crate::error::{Result, WaitableError};

const USER_IDENT: usize = 0;

fn change(ident: usize, filter: i32, flags: u32, fflags: u32, udata: usize) -> libc::kevent {
    // SAFETY: kevent is plain data; zero is a valid value for every field,
    // including the platform-specific extension fields.
    let mut ev: libc::kevent = unsafe { std::mem::zeroed() };
    ev.ident = ident as _;
    ev.filter = filter as _;
    ev.flags = flags as _;
    ev.fflags = fflags as _;
    ev.udata = udata as _;
    ev
}

fn new_kqueue() -> Result<OwnedFd> {
    // SAFETY: kqueue(2) takes no arguments; the result is checked below.
    let raw = unsafe { libc::kqueue() };
    if raw < 0 {
        return Err(WaitableError::last_os_error("kqueue"));
    }
    // SAFETY: fresh descriptor from kqueue(2).
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

fn apply(kq: RawFd, ev: &libc::kevent) -> Result<()> {
    loop {
        // SAFETY: `ev` points to one valid change record, no output buffer
        // is requested, and a null timeout is allowed.
        let ret = unsafe { libc::kevent(kq, ev, 1, ptr::null_mut(), 0, ptr::null()) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(WaitableError::Kernel {
                call: "kevent",
                source: err,
            });
        }
    }
}

fn timespec(deadline: Option<Instant>) -> Option<libc::timespec> {
    remaining(deadline).map(|left| libc::timespec {
        tv_sec: left.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: left.subsec_nanos() as _,
    })
}

/// Result of fetching at most `out.len()` pending knotes.
enum Fetch {
    Delivered(usize),
    TimedOut,
    Interrupted,
}

fn fetch(kq: RawFd, out: &mut [libc::kevent], timeout: Option<libc::timespec>) -> Result<Fetch> {
    let timeout_ptr = timeout
        .as_ref()
        .map_or(ptr::null(), |ts| ts as *const libc::timespec);
    // SAFETY: `out` is writable for `out.len()` records and `timeout_ptr` is
    // either null or borrows `timeout`, which outlives the call.
    let n = unsafe {
        libc::kevent(
            kq,
            ptr::null(),
            0,
            out.as_mut_ptr(),
            out.len() as libc::c_int,
            timeout_ptr,
        )
    };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Fetch::Interrupted);
        }
        return Err(WaitableError::Kernel {
            call: "kevent",
            source: err,
        });
    }
    if n == 0 {
        return Ok(Fetch::TimedOut);
    }
    Ok(Fetch::Delivered(n as usize))
}

/// Private kqueue with a single `EVFILT_USER` knote.
#[derive(Debug)]
pub(crate) struct UserEvent {
    kq: OwnedFd,
}

impl UserEvent {
    /// Whether the private kqueue has a pending knote. Uses `poll` on the
    /// kqueue descriptor, which never retrieves or clears the knote.
    fn pending(&self) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.kq.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            // SAFETY: `pfd` is a valid pollfd for the duration of the call and
            // the count matches the single entry.
            let n = unsafe { libc::poll(&mut pfd, 1, 0) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(WaitableError::Kernel {
                    call: "poll(kqueue)",
                    source: err,
                });
            }
            if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                return Err(WaitableError::Kernel {
                    call: "poll(kqueue)",
                    source: io::Error::from_raw_os_error(libc::EBADF),
                });
            }
            return Ok(n > 0 && pfd.revents & libc::POLLIN != 0);
        }
    }
}

impl KernelEvent for UserEvent {
    fn register(auto_clear: bool) -> Result<Self> {
        let kq = new_kqueue()?;
        let mut flags = libc::EV_ADD as u32;
        if auto_clear {
            flags |= libc::EV_CLEAR as u32;
        }
        apply(
            kq.as_raw_fd(),
            &change(USER_IDENT, libc::EVFILT_USER as i32, flags, 0, 0),
        )?;
        trace!(kq = kq.as_raw_fd(), auto_clear, "registered EVFILT_USER knote");
        Ok(Self { kq })
    }

    fn trigger(&self) -> Result<()> {
        apply(
            self.kq.as_raw_fd(),
            &change(
                USER_IDENT,
                libc::EVFILT_USER as i32,
                0,
                libc::NOTE_TRIGGER as u32,
                0,
            ),
        )
    }

    fn clear(&self) -> Result<()> {
        // EV_CLEAR on an existing user knote drops its triggered state
        apply(
            self.kq.as_raw_fd(),
            &change(
                USER_IDENT,
                libc::EVFILT_USER as i32,
                libc::EV_CLEAR as u32,
                0,
                0,
            ),
        )
    }

    fn is_triggered(&self) -> Result<bool> {
        self.pending()
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool> {
        let mut out = [change(0, 0, 0, 0, 0)];
        loop {
            match fetch(self.kq.as_raw_fd(), &mut out, timespec(deadline))? {
                Fetch::Delivered(_) => return Ok(true),
                Fetch::Interrupted => {}
                Fetch::TimedOut => {
                    if expired(deadline) {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

/// Scoped kqueue used by `wait_many`.
#[derive(Debug)]
pub(crate) struct KqueueMux {
    kq: OwnedFd,
    watched: usize,
}

impl KernelMux for KqueueMux {
    type Event = UserEvent;

    fn new(capacity: usize) -> Result<Self> {
        let kq = new_kqueue()?;
        trace!(kq = kq.as_raw_fd(), capacity, "created wait_many kqueue");
        Ok(Self { kq, watched: 0 })
    }

    fn watch(&mut self, event: &UserEvent, tag: usize) -> Result<()> {
        // re-adding the same ident updates udata, so duplicates are harmless
        apply(
            self.kq.as_raw_fd(),
            &change(
                event.kq.as_raw_fd() as usize,
                libc::EVFILT_READ as i32,
                (libc::EV_ADD | libc::EV_CLEAR) as u32,
                0,
                tag,
            ),
        )?;
        self.watched += 1;
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<Vec<usize>> {
        let mut out = vec![change(0, 0, 0, 0, 0); self.watched.max(1)];
        loop {
            match fetch(self.kq.as_raw_fd(), &mut out, None)? {
                Fetch::Delivered(n) => {
                    return Ok(out.iter().take(n).map(|ev| ev.udata as usize).collect());
                }
                Fetch::Interrupted => continue,
                Fetch::TimedOut => {
                    return Err(WaitableError::EmptyDelivery { call: "kevent" });
                }
            }
        }
    }
}
