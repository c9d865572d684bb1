// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The tagged-value model every key in a shard maps to.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::bptree::{Key as TreeKey, OrderStatTree};
use crate::cms::CountMinSketch;

/// A sorted set: a `member -> score` dictionary kept in lock-step with an
/// order-statistic tree over `(score, member)` pairs, so membership/score
/// lookups are O(1) while rank and range queries stay O(log n).
pub struct SortedSet {
    pub(crate) dict: HashMap<String, f64>,
    pub(crate) tree: OrderStatTree,
}

impl SortedSet {
    pub fn new(branching_factor: usize) -> Self {
        Self { dict: HashMap::new(), tree: OrderStatTree::new(branching_factor) }
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }
}

/// The value half of a datastore entry. One variant per supported type.
pub enum Value {
    Str(String),
    Set(HashSet<String>),
    SortedSet(SortedSet),
    Cms(CountMinSketch),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Cms(_) => "cms",
        }
    }
}

/// A stored key: its value plus an optional absolute expiry instant.
/// Expiry is checked lazily on every access; there is no background sweep.
/// (The source declares `ActiveExpireFrequency`/`SampleSize`/`Threshold`
/// constants for one but never wires them up — lazy expiry is the only
/// mechanism this module carries forward.)
pub struct Entry {
    pub value: Value,
    pub expire_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self { value, expire_at: None }
    }

    pub fn with_expiry(value: Value, expire_at: Instant) -> Self {
        Self { value, expire_at: Some(expire_at) }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expire_at, Some(at) if at <= now)
    }
}

pub(crate) fn tree_key(score: f64, member: &str) -> TreeKey {
    TreeKey::new(score, member)
}
