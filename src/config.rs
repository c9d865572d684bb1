// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Command-line configuration.

use clap::Parser;

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4).max(2) / 2
}

/// An in-memory, RESP-compatible key-value server.
#[derive(Debug, Parser)]
#[command(name = "kvshardd", version, about)]
pub struct Cli {
    /// Address to bind the RESP listener on.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the RESP listener on.
    #[arg(long, default_value_t = 6380)]
    pub port: u16,

    /// Number of reactor threads multiplexing client sockets.
    #[arg(long)]
    pub io_handlers: Option<usize>,

    /// Number of worker threads (and shards) owning the keyspace.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Bounded capacity of each worker's task queue.
    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Branching factor (maximum children per node) of sorted-set B+ trees.
    #[arg(long, default_value_t = 32)]
    pub branching_factor: usize,

    /// Port for the plaintext diagnostics endpoint; `0` disables it.
    #[arg(long, default_value_t = 6060)]
    pub diagnostics_port: u16,
}

impl Cli {
    pub fn io_handlers(&self) -> usize {
        self.io_handlers.unwrap_or_else(default_parallelism).max(1)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(default_parallelism).max(1)
    }
}
