// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! BSD/macOS backend: `kqueue`/`kevent`.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use super::{Event, Interest, Multiplexer};

pub struct KqueueMultiplexer {
    kq: RawFd,
    events_buf: Vec<libc::kevent>,
}

impl KqueueMultiplexer {
    pub fn new() -> io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }
        let blank: libc::kevent = unsafe { std::mem::zeroed() };
        Ok(Self { kq, events_buf: vec![blank; 1024] })
    }

    fn register(&self, fd: RawFd, filter: i16, flags: u16) -> io::Result<()> {
        let change = libc::kevent {
            ident: fd as usize,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };
        let rc = unsafe {
            libc::kevent(self.kq, &change, 1, ptr::null_mut(), 0, ptr::null())
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Multiplexer for KqueueMultiplexer {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match interest {
            Interest::Read => self.register(fd, libc::EVFILT_READ, libc::EV_ADD | libc::EV_CLEAR),
            Interest::Write => {
                self.register(fd, libc::EVFILT_WRITE, libc::EV_ADD | libc::EV_CLEAR)
            }
            Interest::ReadWrite => {
                self.register(fd, libc::EVFILT_READ, libc::EV_ADD | libc::EV_CLEAR)?;
                self.register(fd, libc::EVFILT_WRITE, libc::EV_ADD | libc::EV_CLEAR)
            }
        }
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        // kqueue has no in-place filter swap; drop both filters and re-add
        // the one requested.
        let _ = self.register(fd, libc::EVFILT_READ, libc::EV_DELETE);
        let _ = self.register(fd, libc::EVFILT_WRITE, libc::EV_DELETE);
        self.add(fd, interest)
    }

    fn delete(&mut self, fd: RawFd) -> io::Result<()> {
        let _ = self.register(fd, libc::EVFILT_READ, libc::EV_DELETE);
        let _ = self.register(fd, libc::EVFILT_WRITE, libc::EV_DELETE);
        Ok(())
    }

    fn wait(&mut self, timeout_ms: i32) -> io::Result<Vec<Event>> {
        let timeout = libc::timespec {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_nsec: ((timeout_ms % 1000) * 1_000_000) as libc::c_long,
        };
        loop {
            let n = unsafe {
                libc::kevent(
                    self.kq,
                    ptr::null(),
                    0,
                    self.events_buf.as_mut_ptr(),
                    self.events_buf.len() as i32,
                    &timeout,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            let mut out = Vec::with_capacity(n as usize);
            for raw in &self.events_buf[..n as usize] {
                let is_error = raw.flags & libc::EV_ERROR != 0;
                let is_eof = raw.flags & libc::EV_EOF != 0;
                out.push(Event {
                    fd: raw.ident as RawFd,
                    readable: raw.filter == libc::EVFILT_READ,
                    writable: raw.filter == libc::EVFILT_WRITE,
                    hup_or_err: is_error || is_eof,
                });
            }
            return Ok(out);
        }
    }
}

impl Drop for KqueueMultiplexer {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
