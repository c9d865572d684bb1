// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Minimal blocking plaintext diagnostics responder. Every connection gets
//! one metrics snapshot and is closed; there is no protocol beyond that.
//! Disabled by passing `--diagnostics-port 0`.

use std::io::Write;
use std::net::TcpListener;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::metrics;

const POLL_TIMEOUT_MS: i32 = 200;

pub fn run(host: &str, port: u16, shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port))?;
    listener.set_nonblocking(true)?;
    let fd = listener.as_raw_fd();

    tracing::info!(port, "diagnostics endpoint listening");
    while !shutdown.load(Ordering::Relaxed) {
        let mut pollfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
        let rc = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };
        if rc <= 0 {
            continue;
        }
        match listener.accept() {
            Ok((mut stream, _)) => {
                let snapshot = metrics::global().render();
                let _ = stream.write_all(snapshot.as_bytes());
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                tracing::warn!(error = %e, "diagnostics accept failed");
            }
        }
    }
    Ok(())
}
