// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The self-pipe trick: lets one thread interrupt another thread's blocked
//! `Multiplexer::wait` by making its read end become readable.
//!
//! Every `IoHandler` owns one `Waker`. Its read end is registered with the
//! handler's own multiplexer; the write end is cloned out to whoever needs
//! to hand the handler new work (the acceptor, handing off freshly accepted
//! connections).

use std::io;
use std::os::unix::io::RawFd;

pub struct Waker {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl Waker {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        for fd in fds {
            set_nonblocking(fd)?;
        }
        Ok(Self { read_fd: fds[0], write_fd: fds[1] })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// A cheap, `Send`-able handle that can wake this `Waker`'s owner from
    /// another thread without touching the read side.
    pub fn sender(&self) -> WakerSender {
        WakerSender { write_fd: self.write_fd }
    }

    /// Drains every pending wakeup byte. Call this after observing the read
    /// fd is readable, before re-entering `wait`.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

/// The write-side-only handle other threads hold to wake a `Waker`.
#[derive(Clone, Copy)]
pub struct WakerSender {
    write_fd: RawFd,
}

unsafe impl Send for WakerSender {}

impl WakerSender {
    pub fn wake(&self) {
        let byte = [1u8; 1];
        unsafe {
            libc::write(self.write_fd, byte.as_ptr() as *const _, 1);
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
