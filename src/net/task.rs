// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The unit of work handed from a reactor thread to a worker thread.

use std::sync::mpsc::SyncSender;

/// One command dispatched to exactly one shard, or a `KEYS` broadcast leg
/// dispatched identically to every shard.
pub enum Task {
    Command { name: String, args: Vec<String>, reply_tx: SyncSender<Vec<u8>> },
    Keys { reply_tx: SyncSender<Vec<String>> },
}
