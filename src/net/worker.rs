// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! A single shard's worker thread: owns one `Shard` exclusively and drains
//! its bounded task queue until every sender is dropped.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use crate::metrics;
use crate::net::task::Task;
use crate::store::{self, Shard};

/// The reactor-facing handle to a running worker thread.
pub struct WorkerHandle {
    pub id: usize,
    pub sender: SyncSender<Task>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Drops this handle's sender (prompting the worker to drain and exit
    /// once every other clone is also dropped) and joins the thread.
    pub fn shutdown(mut self) {
        drop(self.sender.clone());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Spawns a worker thread owning a fresh `Shard` and returns the handle used
/// to send it work.
pub fn spawn(id: usize, queue_capacity: usize, branching_factor: usize) -> WorkerHandle {
    let (sender, receiver): (SyncSender<Task>, Receiver<Task>) =
        mpsc::sync_channel(queue_capacity);
    let join = std::thread::Builder::new()
        .name(format!("kvshard-worker-{id}"))
        .spawn(move || run(id, receiver, branching_factor))
        .expect("failed to spawn worker thread");
    WorkerHandle { id, sender, join: Some(join) }
}

fn run(id: usize, receiver: Receiver<Task>, branching_factor: usize) {
    let mut shard = Shard::new(branching_factor);
    tracing::debug!(worker = id, "worker started");
    for task in receiver.iter() {
        match task {
            Task::Command { name, args, reply_tx } => {
                let reply = store::execute(&mut shard, &name, &args);
                metrics::record_command_executed();
                let _ = reply_tx.send(reply.encode());
            }
            Task::Keys { reply_tx } => {
                let _ = reply_tx.send(shard.keys());
            }
        }
    }
    tracing::debug!(worker = id, "worker drained and exiting");
}
