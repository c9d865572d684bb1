// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The storage engine: per-shard datastores, the tagged-value entry model,
//! and the command table that drives them.

pub mod command;
pub mod entry;
pub mod shard;

pub use command::{execute, keys_pattern_reply, BROADCAST_COMMANDS};
pub use shard::Shard;
