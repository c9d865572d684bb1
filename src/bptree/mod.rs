// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Order-statistic B+ tree used by sorted-set entries.

mod node;
mod tree;

pub use node::Key;
pub use tree::{OrderStatTree, MIN_BRANCHING_FACTOR};
