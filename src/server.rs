// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Wires the acceptor, I/O handlers, worker pool, and diagnostics endpoint
//! together, and drives the cooperative shutdown sequence.

use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Cli;
use crate::net;
use crate::net::task::Task;

pub struct Server {
    cli: Cli,
}

impl Server {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Binds the listener, spawns every thread, and blocks until `SIGINT`
    /// or `SIGTERM` is received, then drains everything in order: stop
    /// accepting, close the listener, drain worker queues, close worker
    /// sinks, close each multiplexer.
    pub fn run(self) -> anyhow::Result<()> {
        block_termination_signals()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let signal_thread = {
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("kvshard-signals".to_string())
                .spawn(move || wait_for_shutdown_signal(shutdown))?
        };

        let listen_fd = net::acceptor::bind_listener(&self.cli.host, self.cli.port)?;
        tracing::info!(host = %self.cli.host, port = self.cli.port, "listening");

        let num_workers = self.cli.workers();
        let mut worker_handles = Vec::with_capacity(num_workers);
        let mut worker_senders = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let handle =
                net::worker::spawn(id, self.cli.queue_capacity, self.cli.branching_factor);
            worker_senders.push(handle.sender.clone());
            worker_handles.push(handle);
        }
        let worker_senders: Arc<Vec<std::sync::mpsc::SyncSender<Task>>> =
            Arc::new(worker_senders);
        tracing::info!(workers = num_workers, "worker pool started");

        let num_handlers = self.cli.io_handlers();
        let mut handoffs = Vec::with_capacity(num_handlers);
        let mut handler_threads = Vec::with_capacity(num_handlers);
        for id in 0..num_handlers {
            let (handler, handoff) =
                net::reactor::IoHandler::new(id, worker_senders.clone(), shutdown.clone())?;
            handoffs.push(handoff);
            let join = std::thread::Builder::new()
                .name(format!("kvshard-io-{id}"))
                .spawn(move || handler.run())?;
            handler_threads.push(join);
        }
        tracing::info!(io_handlers = num_handlers, "io handlers started");

        let acceptor_shutdown = shutdown.clone();
        let acceptor_thread = std::thread::Builder::new()
            .name("kvshard-acceptor".to_string())
            .spawn(move || net::acceptor::run(listen_fd, handoffs, acceptor_shutdown))?;

        let diagnostics_thread = if self.cli.diagnostics_port != 0 {
            let diag_shutdown = shutdown.clone();
            let host = self.cli.host.clone();
            let port = self.cli.diagnostics_port;
            Some(
                std::thread::Builder::new()
                    .name("kvshard-diagnostics".to_string())
                    .spawn(move || {
                        if let Err(e) = net::diagnostics::run(&host, port, diag_shutdown) {
                            tracing::warn!(error = %e, "diagnostics endpoint exited");
                        }
                    })?,
            )
        } else {
            None
        };

        // Blocks until the signal thread observes SIGINT/SIGTERM.
        let _ = signal_thread.join();

        let _ = acceptor_thread.join();
        for join in handler_threads {
            let _ = join.join();
        }
        if let Some(join) = diagnostics_thread {
            let _ = join.join();
        }

        // Every io-handler thread has exited and dropped its clone of the
        // worker-sender table; dropping this last clone lets each worker's
        // queue disconnect once its own sender is dropped below.
        drop(worker_senders);
        for handle in worker_handles {
            handle.shutdown();
        }

        tracing::info!("shutdown complete");
        Ok(())
    }
}

fn termination_sigset() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
        set
    }
}

/// Blocks `SIGINT`/`SIGTERM` process-wide. Must run before any other
/// thread is spawned, since the blocked mask only propagates to threads
/// created after this call.
fn block_termination_signals() -> anyhow::Result<()> {
    let set = termination_sigset();
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
    if rc != 0 {
        anyhow::bail!("pthread_sigmask failed: {}", std::io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

/// Parks in `sigwait` for a blocked termination signal, then flips the
/// shared shutdown flag.
fn wait_for_shutdown_signal(shutdown: Arc<AtomicBool>) {
    let set = termination_sigset();
    let mut received: libc::c_int = 0;
    unsafe {
        libc::sigwait(&set, &mut received);
    }
    tracing::info!(signal = received, "shutdown signal received");
    shutdown.store(true, Ordering::Relaxed);
}
