// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Accepts inbound connections on the raw listening socket and round-robins
//! each one to an `IoHandler` via its self-pipe waker.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::KvResult;
use crate::net::reactor::IoHandlerHandoff;

const LISTEN_BACKLOG: i32 = 1024;
const ACCEPT_POLL_TIMEOUT_MS: i32 = 200;

/// Binds a non-blocking `AF_INET`/`SOCK_STREAM` listening socket with
/// `SO_REUSEADDR` and `SO_REUSEPORT` set before `bind`, matching the
/// source's listener setup.
pub fn bind_listener(host: &str, port: u16) -> KvResult<RawFd> {
    bind_listener_inner(host, port).map_err(|e| {
        crate::error::KvError::Protocol(format!("failed to bind {host}:{port}: {e}"))
    })
}

fn bind_listener_inner(host: &str, port: u16) -> io::Result<RawFd> {
    let addr = Ipv4Addr::from_str(host).unwrap_or(Ipv4Addr::UNSPECIFIED);

    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let enable: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &enable as *const _ as *const libc::c_void,
            mem::size_of_val(&enable) as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            &enable as *const _ as *const libc::c_void,
            mem::size_of_val(&enable) as libc::socklen_t,
        );
    }

    set_nonblocking(fd)?;

    let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
    sockaddr.sin_family = libc::AF_INET as libc::sa_family_t;
    sockaddr.sin_port = port.to_be();
    sockaddr.sin_addr.s_addr = u32::from(addr).to_be();

    let rc = unsafe {
        libc::bind(
            fd,
            &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }

    let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }

    Ok(fd)
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

/// Runs the accept loop until `shutdown` is observed. Polls the listening
/// fd with a bounded timeout rather than blocking forever, for the same
/// cooperative-shutdown reason the reactors do.
pub fn run(listen_fd: RawFd, handoffs: Vec<IoHandlerHandoff>, shutdown: Arc<AtomicBool>) {
    let mut next_handler = 0usize;
    while !shutdown.load(Ordering::Relaxed) {
        let mut pollfd = libc::pollfd { fd: listen_fd, events: libc::POLLIN, revents: 0 };
        let rc = unsafe { libc::poll(&mut pollfd, 1, ACCEPT_POLL_TIMEOUT_MS) };
        if rc <= 0 {
            continue;
        }

        loop {
            let conn_fd = unsafe { libc::accept(listen_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
            if conn_fd < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EAGAIN) => break,
                    Some(libc::EINTR) => continue,
                    _ => {
                        tracing::warn!(error = %err, "accept failed");
                        break;
                    }
                }
            }

            if set_nonblocking(conn_fd).is_err() {
                unsafe {
                    libc::close(conn_fd);
                }
                continue;
            }

            let handler = &handoffs[next_handler % handoffs.len()];
            next_handler = next_handler.wrapping_add(1);
            handler.hand_off(conn_fd);
        }
    }
    unsafe {
        libc::close(listen_fd);
    }
}
