// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide counters, exposed by the diagnostics endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

pub struct Metrics {
    commands_executed: AtomicU64,
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics {
    commands_executed: AtomicU64::new(0),
    connections_accepted: AtomicU64::new(0),
    connections_closed: AtomicU64::new(0),
    bytes_read: AtomicU64::new(0),
    bytes_written: AtomicU64::new(0),
});

pub fn global() -> &'static Metrics {
    &METRICS
}

pub fn record_command_executed() {
    METRICS.commands_executed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_accepted() {
    METRICS.connections_accepted.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_closed() {
    METRICS.connections_closed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_bytes_read(n: u64) {
    METRICS.bytes_read.fetch_add(n, Ordering::Relaxed);
}

pub fn record_bytes_written(n: u64) {
    METRICS.bytes_written.fetch_add(n, Ordering::Relaxed);
}

impl Metrics {
    /// Renders the current snapshot as plaintext `key value` lines, served
    /// by the diagnostics endpoint.
    pub fn render(&self) -> String {
        format!(
            "commands_executed {}\nconnections_accepted {}\nconnections_closed {}\nbytes_read {}\nbytes_written {}\n",
            self.commands_executed.load(Ordering::Relaxed),
            self.connections_accepted.load(Ordering::Relaxed),
            self.connections_closed.load(Ordering::Relaxed),
            self.bytes_read.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
        )
    }

    pub fn active_connections(&self) -> u64 {
        self.connections_accepted
            .load(Ordering::Relaxed)
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_one_line_per_counter() {
        let snapshot = global().render();
        assert_eq!(snapshot.lines().count(), 5);
    }
}
