// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The I/O handler: one reactor thread per `--io-handlers` slot. Owns a
//! multiplexer, a self-pipe waker the acceptor uses to hand off freshly
//! accepted connections, and the per-connection read buffers needed to
//! reassemble RESP frames split across multiple `read`s.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;

use crate::hash;
use crate::metrics;
use crate::net::mux::{Event, Interest, Multiplexer, SysMultiplexer};
use crate::net::task::Task;
use crate::net::waker::{Waker, WakerSender};
use crate::resp::{self, decode::Decoded, Reply};
use crate::store;

/// How long a reactor blocks in one `wait` call before re-checking the
/// shutdown flag. Bounded rather than infinite so shutdown is never stuck
/// behind a socket that never becomes ready again.
pub const REACTOR_POLL_TIMEOUT_MS: i32 = 200;

const READ_BUF_SIZE: usize = 64 * 1024;

/// What the acceptor holds to push a new connection at a specific handler.
#[derive(Clone)]
pub struct IoHandlerHandoff {
    incoming_tx: SyncSender<RawFd>,
    waker: WakerSender,
}

impl IoHandlerHandoff {
    pub fn hand_off(&self, fd: RawFd) {
        if self.incoming_tx.try_send(fd).is_err() {
            unsafe {
                libc::close(fd);
            }
            return;
        }
        self.waker.wake();
    }
}

enum PendingReply {
    Command(Receiver<Vec<u8>>),
    Keys { pattern: String, receiver: Receiver<Vec<String>>, expected: usize },
}

impl PendingReply {
    fn resolve_into(self, out: &mut Vec<u8>) {
        match self {
            PendingReply::Command(rx) => {
                if let Ok(bytes) = rx.recv() {
                    out.extend_from_slice(&bytes);
                }
            }
            PendingReply::Keys { pattern, receiver, expected } => {
                let mut merged = Vec::new();
                for _ in 0..expected {
                    if let Ok(mut keys) = receiver.recv() {
                        merged.append(&mut keys);
                    }
                }
                let reply = store::keys_pattern_reply(&pattern, merged);
                out.extend_from_slice(&reply.encode());
            }
        }
    }
}

pub struct IoHandler {
    id: usize,
    mux: SysMultiplexer,
    waker: Waker,
    incoming: Receiver<RawFd>,
    workers: Arc<Vec<SyncSender<Task>>>,
    conns: HashMap<RawFd, Vec<u8>>,
    /// Bytes still waiting to be written once a backed-up socket becomes
    /// writable again. A connection listed here is registered for
    /// `Interest::ReadWrite` instead of `Interest::Read`.
    pending_writes: HashMap<RawFd, Vec<u8>>,
    shutdown: Arc<AtomicBool>,
}

impl IoHandler {
    pub fn new(
        id: usize,
        workers: Arc<Vec<SyncSender<Task>>>,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<(Self, IoHandlerHandoff)> {
        let mux = SysMultiplexer::new()?;
        let waker = Waker::new()?;
        let (incoming_tx, incoming_rx) = mpsc::sync_channel(1024);
        let handoff = IoHandlerHandoff { incoming_tx, waker: waker.sender() };
        let handler = Self {
            id,
            mux,
            waker,
            incoming: incoming_rx,
            workers,
            conns: HashMap::new(),
            pending_writes: HashMap::new(),
            shutdown,
        };
        Ok((handler, handoff))
    }

    pub fn run(mut self) {
        if let Err(e) = self.mux.add(self.waker.read_fd(), Interest::Read) {
            tracing::error!(handler = self.id, error = %e, "failed to register waker fd");
            return;
        }
        tracing::debug!(handler = self.id, "io handler started");
        while !self.shutdown.load(Ordering::Relaxed) {
            let events = match self.mux.wait(REACTOR_POLL_TIMEOUT_MS) {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(handler = self.id, error = %e, "multiplexer wait failed");
                    continue;
                }
            };
            for event in events {
                self.handle_event(event);
            }
        }
        for fd in self.conns.keys().copied().collect::<Vec<_>>() {
            unsafe {
                libc::close(fd);
            }
        }
        tracing::debug!(handler = self.id, "io handler shut down");
    }

    fn handle_event(&mut self, event: Event) {
        if event.fd == self.waker.read_fd() {
            self.waker.drain();
            self.accept_pending();
            return;
        }
        if event.hup_or_err {
            self.close_conn(event.fd);
            return;
        }
        if event.writable {
            self.try_flush(event.fd);
            if self.pending_writes.contains_key(&event.fd) {
                // Still backed up. Leave any read for the next time this fd
                // reports writable rather than piling more into `conns`.
                return;
            }
        }
        if event.readable {
            self.handle_readable(event.fd);
        }
    }

    fn accept_pending(&mut self) {
        while let Ok(fd) = self.incoming.try_recv() {
            if self.mux.add(fd, Interest::Read).is_ok() {
                self.conns.insert(fd, Vec::new());
                metrics::record_connection_accepted();
            } else {
                unsafe {
                    libc::close(fd);
                }
            }
        }
    }

    fn handle_readable(&mut self, fd: RawFd) {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n > 0 {
                metrics::record_bytes_read(n as u64);
                self.conns.entry(fd).or_default().extend_from_slice(&buf[..n as usize]);
                continue;
            }
            if n == 0 {
                self.close_conn(fd);
                return;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => break,
                Some(libc::EINTR) => continue,
                _ => {
                    self.close_conn(fd);
                    return;
                }
            }
        }
        self.process_buffer(fd);
    }

    fn process_buffer(&mut self, fd: RawFd) {
        let mut buf = match self.conns.remove(&fd) {
            Some(buf) => buf,
            None => return,
        };

        let mut offset = 0;
        let mut pending = Vec::new();
        let mut protocol_error = None;
        loop {
            match resp::try_parse_command(&buf[offset..]) {
                Ok(Decoded::Complete { command, consumed }) => {
                    offset += consumed;
                    let mut iter = command.into_iter();
                    let name = iter.next().expect("non-empty command");
                    let args: Vec<String> = iter.collect();
                    pending.push(self.dispatch(name, args));
                }
                Ok(Decoded::Incomplete) => break,
                Err(e) => {
                    protocol_error = Some(e);
                    break;
                }
            }
        }
        buf.drain(..offset);
        self.conns.insert(fd, buf);

        let mut out = Vec::new();
        for p in pending {
            p.resolve_into(&mut out);
        }
        if !out.is_empty() {
            metrics::record_bytes_written(out.len() as u64);
            self.queue_write(fd, &out);
        }
        if let Some(e) = protocol_error {
            let bytes = Reply::Error(e.to_string()).encode();
            // The connection is closing regardless, so one best-effort write
            // is enough; there is no next `wait` iteration to flush into.
            self.write_once(fd, &bytes);
            self.close_conn(fd);
        }
    }

    fn dispatch(&self, name: String, args: Vec<String>) -> PendingReply {
        let upper = name.to_uppercase();
        if store::BROADCAST_COMMANDS.contains(&upper.as_str()) {
            let pattern = args.first().cloned().unwrap_or_default();
            let expected = self.workers.len();
            let (tx, rx) = mpsc::sync_channel(expected.max(1));
            for worker in self.workers.iter() {
                let _ = worker.send(Task::Keys { reply_tx: tx.clone() });
            }
            return PendingReply::Keys { pattern, receiver: rx, expected };
        }

        let shard_id = match args.first() {
            Some(key) => hash::shard_for_key(key.as_bytes(), self.workers.len()),
            None => rand::random::<usize>() % self.workers.len(),
        };
        let (tx, rx) = mpsc::sync_channel(1);
        let _ = self.workers[shard_id].send(Task::Command { name, args, reply_tx: tx });
        PendingReply::Command(rx)
    }

    /// Queues `data` for `fd`, flushing as much as the socket accepts right
    /// now. Whatever doesn't fit waits for the next writable-readiness event
    /// instead of spinning the reactor thread on `EAGAIN`.
    fn queue_write(&mut self, fd: RawFd, data: &[u8]) {
        self.pending_writes.entry(fd).or_default().extend_from_slice(data);
        self.try_flush(fd);
    }

    /// Writes as much of `fd`'s pending buffer as the socket will currently
    /// accept. Returns to the caller on `EAGAIN` rather than looping.
    fn try_flush(&mut self, fd: RawFd) {
        let Some(buf) = self.pending_writes.get_mut(&fd) else { return };
        let mut offset = 0;
        while offset < buf.len() {
            let n = unsafe {
                libc::write(fd, buf[offset..].as_ptr() as *const _, buf.len() - offset)
            };
            if n > 0 {
                offset += n as usize;
                continue;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => break,
                _ => {
                    self.pending_writes.remove(&fd);
                    self.close_conn(fd);
                    return;
                }
            }
        }
        buf.drain(..offset);
        if buf.is_empty() {
            self.pending_writes.remove(&fd);
            let _ = self.mux.modify(fd, Interest::Read);
        } else {
            let _ = self.mux.modify(fd, Interest::ReadWrite);
        }
    }

    /// A single non-blocking write attempt, used only when the connection is
    /// about to be closed and there is no further `wait` iteration to flush
    /// a partial write into.
    fn write_once(&self, fd: RawFd, data: &[u8]) {
        let mut offset = 0;
        while offset < data.len() {
            let n = unsafe {
                libc::write(fd, data[offset..].as_ptr() as *const _, data.len() - offset)
            };
            if n > 0 {
                offset += n as usize;
                continue;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                _ => return,
            }
        }
    }

    fn close_conn(&mut self, fd: RawFd) {
        let _ = self.mux.delete(fd);
        self.conns.remove(&fd);
        self.pending_writes.remove(&fd);
        unsafe {
            libc::close(fd);
        }
        metrics::record_connection_closed();
    }
}
