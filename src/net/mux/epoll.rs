// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Linux backend: `epoll_create1`/`epoll_ctl`/`epoll_wait`.

use std::io;
use std::os::unix::io::RawFd;

use super::{Event, Interest, Multiplexer};

pub struct EpollMultiplexer {
    epfd: RawFd,
    events_buf: Vec<libc::epoll_event>,
}

fn interest_to_bits(interest: Interest) -> u32 {
    match interest {
        Interest::Read => (libc::EPOLLIN | libc::EPOLLRDHUP) as u32,
        Interest::Write => libc::EPOLLOUT as u32,
        Interest::ReadWrite => (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLOUT) as u32,
    }
}

impl EpollMultiplexer {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(0) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epfd, events_buf: vec![unsafe { std::mem::zeroed() }; 1024] })
    }

    fn ctl(&self, op: i32, fd: RawFd, interest: Option<Interest>) -> io::Result<()> {
        let mut ev: libc::epoll_event = unsafe { std::mem::zeroed() };
        if let Some(interest) = interest {
            ev.events = interest_to_bits(interest);
            ev.u64 = fd as u64;
        }
        let rc = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Multiplexer for EpollMultiplexer {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, Some(interest))
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, Some(interest))
    }

    fn delete(&mut self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, None)
    }

    fn wait(&mut self, timeout_ms: i32) -> io::Result<Vec<Event>> {
        loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.epfd,
                    self.events_buf.as_mut_ptr(),
                    self.events_buf.len() as i32,
                    timeout_ms,
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
                let bits = raw.events as i32;
                out.push(Event {
                    fd: raw.u64 as RawFd,
                    readable: bits & libc::EPOLLIN != 0,
                    writable: bits & libc::EPOLLOUT != 0,
                    hup_or_err: bits & (libc::EPOLLERR | libc::EPOLLHUP | libc::EPOLLRDHUP) != 0,
                });
            }
            return Ok(out);
        }
    }
}

impl Drop for EpollMultiplexer {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
