// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Count-min sketch: a fixed-size, probabilistic frequency counter.
//!
//! A `width * depth` matrix of atomic counters. Each `IncrBy` touches one
//! counter per row (`depth` total), selected by hashing the item with a
//! distinct seed per row; `Query` reports the minimum of those counters,
//! which is always an overestimate (never an underestimate) of the true
//! count. Counters saturate at `u32::MAX` rather than wrapping.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{KvError, KvResult};
use crate::hash::fnv1a32;

/// A count-min sketch with `width` columns and `depth` independent rows.
#[derive(Debug)]
pub struct CountMinSketch {
    width: u32,
    depth: u32,
    counters: Vec<AtomicU32>,
}

impl CountMinSketch {
    /// Builds a sketch with explicit dimensions. Both must be nonzero.
    pub fn by_dim(width: u32, depth: u32) -> KvResult<Self> {
        if width == 0 || depth == 0 {
            return Err(KvError::SyntaxError);
        }
        let cells = width as usize * depth as usize;
        let mut counters = Vec::with_capacity(cells);
        counters.resize_with(cells, || AtomicU32::new(0));
        Ok(Self { width, depth, counters })
    }

    /// Builds a sketch sized from an error rate and error probability, using
    /// the standard `(e / error_rate, ln(1 / error_prob))` formula.
    pub fn by_prob(error_rate: f64, error_prob: f64) -> KvResult<Self> {
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(KvError::CmsInvalidOverestimation);
        }
        if !(error_prob > 0.0 && error_prob < 1.0) {
            return Err(KvError::CmsInvalidProbability);
        }
        let width = (std::f64::consts::E / error_rate).ceil() as u32;
        let depth = (1.0f64 / error_prob).ln().ceil() as u32;
        Self::by_dim(width.max(1), depth.max(1))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn cell_index(&self, row: u32, col: u32) -> usize {
        row as usize * self.width as usize + col as usize
    }

    fn row_hash(&self, item: &str, row: u32) -> u32 {
        let mut seeded = Vec::with_capacity(item.len() + 4);
        seeded.extend_from_slice(&row.to_le_bytes());
        seeded.extend_from_slice(item.as_bytes());
        fnv1a32(&seeded) % self.width
    }

    /// Adds `value` to every row's counter for `item`, saturating at
    /// `u32::MAX`. Returns the post-increment estimate (the minimum across
    /// rows after the add, matching the source's own reported value).
    pub fn incr_by(&self, item: &str, value: u32) -> u32 {
        let mut min_after = u32::MAX;
        for row in 0..self.depth {
            let col = self.row_hash(item, row);
            let cell = &self.counters[self.cell_index(row, col)];
            let mut current = cell.load(Ordering::Relaxed);
            loop {
                let next = current.saturating_add(value);
                match cell.compare_exchange_weak(
                    current,
                    next,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        min_after = min_after.min(next);
                        break;
                    }
                    Err(observed) => current = observed,
                }
            }
        }
        min_after
    }

    /// Estimated frequency of `item`: the minimum counter across all rows.
    pub fn count(&self, item: &str) -> u32 {
        (0..self.depth)
            .map(|row| {
                let col = self.row_hash(item, row);
                self.counters[self.cell_index(row, col)].load(Ordering::Relaxed)
            })
            .min()
            .unwrap_or(0)
    }

    /// Estimated frequency for each of `items`, in order.
    pub fn query(&self, items: &[String]) -> Vec<u32> {
        items.iter().map(|item| self.count(item)).collect()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for cell in &self.counters {
            cell.store(0, Ordering::Relaxed);
        }
    }

    /// Adds every counter of `other` into `self`. Both sketches must share
    /// `(width, depth)`.
    pub fn merge(&self, other: &CountMinSketch) -> KvResult<()> {
        if self.width != other.width || self.depth != other.depth {
            return Err(KvError::CmsDimensionMismatch);
        }
        for (mine, theirs) in self.counters.iter().zip(other.counters.iter()) {
            let addend = theirs.load(Ordering::Relaxed);
            if addend > 0 {
                let mut current = mine.load(Ordering::Relaxed);
                loop {
                    let next = current.saturating_add(addend);
                    match mine.compare_exchange_weak(
                        current,
                        next,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(observed) => current = observed,
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_never_underestimates_true_frequency() {
        let cms = CountMinSketch::by_dim(64, 4).unwrap();
        for _ in 0..7 {
            cms.incr_by("apple", 1);
        }
        assert!(cms.count("apple") >= 7);
    }

    #[test]
    fn unseen_item_reads_zero_in_a_fresh_sketch() {
        let cms = CountMinSketch::by_dim(64, 4).unwrap();
        assert_eq!(cms.count("never-seen"), 0);
    }

    #[test]
    fn reset_zeroes_all_counters() {
        let cms = CountMinSketch::by_dim(32, 3).unwrap();
        cms.incr_by("x", 10);
        cms.reset();
        assert_eq!(cms.count("x"), 0);
    }

    #[test]
    fn merge_requires_matching_dimensions() {
        let a = CountMinSketch::by_dim(32, 3).unwrap();
        let b = CountMinSketch::by_dim(16, 3).unwrap();
        assert_eq!(a.merge(&b), Err(KvError::CmsDimensionMismatch));
    }

    #[test]
    fn merge_accumulates_counts_from_both_sketches() {
        let a = CountMinSketch::by_dim(64, 4).unwrap();
        let b = CountMinSketch::by_dim(64, 4).unwrap();
        a.incr_by("shared", 3);
        b.incr_by("shared", 5);
        a.merge(&b).unwrap();
        assert!(a.count("shared") >= 8);
    }

    #[test]
    fn by_prob_rejects_out_of_range_inputs() {
        assert_eq!(
            CountMinSketch::by_prob(0.0, 0.01).unwrap_err(),
            KvError::CmsInvalidOverestimation
        );
        assert_eq!(
            CountMinSketch::by_prob(0.01, 1.5).unwrap_err(),
            KvError::CmsInvalidProbability
        );
    }

    #[test]
    fn by_prob_produces_usable_dimensions() {
        let cms = CountMinSketch::by_prob(0.01, 0.01).unwrap();
        assert!(cms.width() > 0);
        assert!(cms.depth() > 0);
    }
}
