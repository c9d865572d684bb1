// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Platform-independent readiness multiplexer abstraction.
//!
//! Two backends implement this trait directly against raw syscalls via
//! `libc` — there is no intermediate async runtime here. `wait` always takes
//! a bounded timeout rather than blocking forever, so every reactor loop can
//! check a shutdown flag between calls instead of staying parked in the
//! kernel indefinitely.

use std::os::unix::io::RawFd;

/// Which readiness condition a registration cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    /// Both at once: used while a connection has a backed-up write buffer
    /// but must still be read from (a client rarely stops both directions
    /// at once).
    ReadWrite,
}

/// One readiness notification for a registered fd.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// Set on `EPOLLERR`/`EV_ERROR` or the kqueue/epoll hangup flags; callers
    /// treat this the same as a read that returned EOF.
    pub hup_or_err: bool,
}

pub trait Multiplexer: Send {
    fn add(&mut self, fd: RawFd, interest: Interest) -> std::io::Result<()>;
    fn modify(&mut self, fd: RawFd, interest: Interest) -> std::io::Result<()>;
    fn delete(&mut self, fd: RawFd) -> std::io::Result<()>;

    /// Blocks up to `timeout_ms` milliseconds for readiness. `EINTR` is
    /// retried internally and never surfaced to the caller.
    fn wait(&mut self, timeout_ms: i32) -> std::io::Result<Vec<Event>>;
}

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub use epoll::EpollMultiplexer as SysMultiplexer;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use kqueue::KqueueMultiplexer as SysMultiplexer;
