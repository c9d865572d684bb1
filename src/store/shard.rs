// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! A single shard's datastore: everything one worker thread owns and
//! mutates without any locking, since the reactor guarantees every key
//! hashes to exactly one shard.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::cms::CountMinSketch;
use crate::error::{KvError, KvResult};
use crate::store::entry::{tree_key, Entry, SortedSet, Value};

/// `-2`: the sentinel `TTL`/`PTTL` reply for a key that does not exist.
pub const TTL_NO_KEY: i64 = -2;
/// `-1`: the sentinel `TTL`/`PTTL` reply for a key with no expiry set.
pub const TTL_NO_EXPIRY: i64 = -1;

pub struct Shard {
    data: HashMap<String, Entry>,
    branching_factor: usize,
}

impl Shard {
    pub fn new(branching_factor: usize) -> Self {
        Self { data: HashMap::new(), branching_factor }
    }

    /// Fetches a live entry, evicting it first if its TTL has lapsed.
    fn get_live(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if matches!(self.data.get(key), Some(e) if e.is_expired(now)) {
            self.data.remove(key);
        }
        self.data.get(key)
    }

    fn get_live_mut(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if matches!(self.data.get(key), Some(e) if e.is_expired(now)) {
            self.data.remove(key);
        }
        self.data.get_mut(key)
    }

    // ---- String family --------------------------------------------------

    pub fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = match ttl {
            Some(d) => Entry::with_expiry(Value::Str(value.to_string()), Instant::now() + d),
            None => Entry::new(Value::Str(value.to_string())),
        };
        self.data.insert(key.to_string(), entry);
    }

    pub fn get(&mut self, key: &str) -> KvResult<Option<String>> {
        match self.get_live(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(KvError::WrongType),
            },
        }
    }

    pub fn ttl_seconds(&mut self, key: &str) -> i64 {
        match self.get_live(key) {
            None => TTL_NO_KEY,
            Some(entry) => match entry.expire_at {
                None => TTL_NO_EXPIRY,
                Some(at) => at.saturating_duration_since(Instant::now()).as_secs() as i64,
            },
        }
    }

    pub fn pttl_millis(&mut self, key: &str) -> i64 {
        match self.get_live(key) {
            None => TTL_NO_KEY,
            Some(entry) => match entry.expire_at {
                None => TTL_NO_EXPIRY,
                Some(at) => at.saturating_duration_since(Instant::now()).as_millis() as i64,
            },
        }
    }

    pub fn expire(&mut self, key: &str, seconds: i64) -> bool {
        self.set_expiry(key, Duration::from_secs(seconds.max(0) as u64))
    }

    pub fn pexpire(&mut self, key: &str, millis: i64) -> bool {
        self.set_expiry(key, Duration::from_millis(millis.max(0) as u64))
    }

    fn set_expiry(&mut self, key: &str, ttl: Duration) -> bool {
        match self.get_live_mut(key) {
            None => false,
            Some(entry) => {
                entry.expire_at = Some(Instant::now() + ttl);
                true
            }
        }
    }

    pub fn persist(&mut self, key: &str) -> bool {
        match self.get_live_mut(key) {
            Some(entry) if entry.expire_at.is_some() => {
                entry.expire_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn exists(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|k| self.get_live(k).is_some()).count()
    }

    pub fn del(&mut self, keys: &[String]) -> usize {
        let mut count = 0;
        for key in keys {
            if self.get_live(key).is_some() {
                self.data.remove(key);
                count += 1;
            }
        }
        count
    }

    /// All live key names in this shard, used by the `KEYS *` broadcast.
    pub fn keys(&mut self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .data
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.data.remove(&key);
        }
        self.data.keys().cloned().collect()
    }

    // ---- Set family -------------------------------------------------------

    pub fn sadd(&mut self, key: &str, members: &[String]) -> KvResult<usize> {
        if self.get_live(key).is_none() {
            self.data.insert(key.to_string(), Entry::new(Value::Set(HashSet::new())));
        }
        let entry = self.data.get_mut(key).expect("just inserted or already present");
        let Value::Set(set) = &mut entry.value else { return Err(KvError::WrongType) };
        let mut added = 0;
        for member in members {
            if set.insert(member.clone()) {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn smembers(&mut self, key: &str) -> KvResult<Vec<String>> {
        match self.get_live(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(KvError::WrongType),
            },
        }
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> KvResult<bool> {
        match self.get_live(key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(KvError::WrongType),
            },
        }
    }

    pub fn smismember(&mut self, key: &str, members: &[String]) -> KvResult<Vec<bool>> {
        match self.get_live(key) {
            None => Ok(vec![false; members.len()]),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(members.iter().map(|m| set.contains(m)).collect()),
                _ => Err(KvError::WrongType),
            },
        }
    }

    // ---- Sorted set family --------------------------------------------------

    fn sorted_set_mut(&mut self, key: &str) -> KvResult<Option<&mut SortedSet>> {
        match self.get_live_mut(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.value {
                Value::SortedSet(zset) => Ok(Some(zset)),
                _ => Err(KvError::WrongType),
            },
        }
    }

    /// Adds or updates `member` with `score`. Returns `true` unless this is
    /// a no-op rescore (the stored score already equals `score`) — a genuine
    /// insert and a score change both count as "added", matching the
    /// source's `ZADD` (a rescore deletes the stale tree key and inserts a
    /// fresh one, which is exactly the shape of an insert).
    pub fn zadd(&mut self, key: &str, score: f64, member: &str) -> KvResult<bool> {
        if self.get_live(key).is_none() {
            self.data.insert(
                key.to_string(),
                Entry::new(Value::SortedSet(SortedSet::new(self.branching_factor))),
            );
        }
        let entry = self.data.get_mut(key).expect("just inserted or already present");
        let Value::SortedSet(zset) = &mut entry.value else { return Err(KvError::WrongType) };

        if let Some(&old_score) = zset.dict.get(member) {
            if old_score == score {
                return Ok(false);
            }
            zset.tree.delete(&tree_key(old_score, member));
        }
        zset.dict.insert(member.to_string(), score);
        zset.tree.insert(tree_key(score, member));
        Ok(true)
    }

    pub fn zscore(&mut self, key: &str, member: &str) -> KvResult<Option<f64>> {
        Ok(self.sorted_set_mut(key)?.and_then(|z| z.dict.get(member).copied()))
    }

    pub fn zcard(&mut self, key: &str) -> KvResult<usize> {
        Ok(self.sorted_set_mut(key)?.map(|z| z.len()).unwrap_or(0))
    }

    pub fn zrank(&mut self, key: &str, member: &str) -> KvResult<Option<usize>> {
        let Some(zset) = self.sorted_set_mut(key)? else { return Ok(None) };
        let Some(&score) = zset.dict.get(member) else { return Ok(None) };
        Ok(zset.tree.rank(&tree_key(score, member)))
    }

    pub fn zrange(&mut self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        let Some(zset) = self.sorted_set_mut(key)? else { return Ok(Vec::new()) };
        Ok(zset.tree.range_by_rank(start, stop).into_iter().map(|k| k.member).collect())
    }

    pub fn zrange_with_score(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvResult<Vec<(String, f64)>> {
        let Some(zset) = self.sorted_set_mut(key)? else { return Ok(Vec::new()) };
        Ok(zset.tree.range_by_rank(start, stop).into_iter().map(|k| (k.member, k.score)).collect())
    }

    pub fn zrem(&mut self, key: &str, members: &[String]) -> KvResult<usize> {
        let removed = match self.sorted_set_mut(key)? {
            None => 0,
            Some(zset) => {
                let mut removed = 0;
                for member in members {
                    if let Some(score) = zset.dict.remove(member) {
                        zset.tree.delete(&tree_key(score, member));
                        removed += 1;
                    }
                }
                removed
            }
        };
        if removed > 0 {
            if let Some(entry) = self.data.get(key) {
                if let Value::SortedSet(z) = &entry.value {
                    if z.len() == 0 {
                        self.data.remove(key);
                    }
                }
            }
        }
        Ok(removed)
    }

    // ---- Count-min sketch family --------------------------------------------

    pub fn cms_init_by_dim(&mut self, key: &str, width: u32, depth: u32) -> KvResult<bool> {
        if let Some(entry) = self.get_live(key) {
            return match &entry.value {
                Value::Cms(_) => Ok(false),
                _ => Err(KvError::WrongType),
            };
        }
        let cms = CountMinSketch::by_dim(width, depth)?;
        self.data.insert(key.to_string(), Entry::new(Value::Cms(cms)));
        Ok(true)
    }

    pub fn cms_init_by_prob(
        &mut self,
        key: &str,
        error_rate: f64,
        error_prob: f64,
    ) -> KvResult<bool> {
        if let Some(entry) = self.get_live(key) {
            return match &entry.value {
                Value::Cms(_) => Ok(false),
                _ => Err(KvError::WrongType),
            };
        }
        let cms = CountMinSketch::by_prob(error_rate, error_prob)?;
        self.data.insert(key.to_string(), Entry::new(Value::Cms(cms)));
        Ok(true)
    }

    fn cms(&mut self, key: &str) -> KvResult<&CountMinSketch> {
        match self.get_live(key) {
            None => Err(KvError::CmsKeyMissing),
            Some(entry) => match &entry.value {
                Value::Cms(cms) => Ok(cms),
                _ => Err(KvError::WrongType),
            },
        }
    }

    pub fn cms_incrby(&mut self, key: &str, item: &str, value: u32) -> KvResult<u32> {
        Ok(self.cms(key)?.incr_by(item, value))
    }

    pub fn cms_query(&mut self, key: &str, items: &[String]) -> KvResult<Vec<u32>> {
        Ok(self.cms(key)?.query(items))
    }

    pub fn cms_info(&mut self, key: &str) -> KvResult<(u32, u32)> {
        let cms = self.cms(key)?;
        Ok((cms.width(), cms.depth()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut shard = Shard::new(8);
        shard.set("k", "v", None);
        assert_eq!(shard.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn get_on_wrong_type_errors() {
        let mut shard = Shard::new(8);
        shard.sadd("k", &["m".to_string()]).unwrap();
        assert_eq!(shard.get("k"), Err(KvError::WrongType));
    }

    #[test]
    fn ttl_reports_sentinels() {
        let mut shard = Shard::new(8);
        assert_eq!(shard.ttl_seconds("missing"), TTL_NO_KEY);
        shard.set("k", "v", None);
        assert_eq!(shard.ttl_seconds("k"), TTL_NO_EXPIRY);
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let mut shard = Shard::new(8);
        shard.set("k", "v", Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(shard.get("k").unwrap(), None);
        assert_eq!(shard.exists(&["k".to_string()]), 0);
    }

    #[test]
    fn sadd_reports_only_newly_added_members() {
        let mut shard = Shard::new(8);
        assert_eq!(shard.sadd("s", &["a".to_string(), "b".to_string()]).unwrap(), 2);
        assert_eq!(shard.sadd("s", &["a".to_string(), "c".to_string()]).unwrap(), 1);
    }

    #[test]
    fn zadd_zrange_and_zrem_stay_consistent() {
        let mut shard = Shard::new(4);
        shard.zadd("z", 3.0, "c").unwrap();
        shard.zadd("z", 1.0, "a").unwrap();
        shard.zadd("z", 2.0, "b").unwrap();
        assert_eq!(shard.zrange("z", 0, -1).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(shard.zrank("z", "b").unwrap(), Some(1));
        assert_eq!(shard.zrem("z", &["b".to_string()]).unwrap(), 1);
        assert_eq!(shard.zcard("z").unwrap(), 2);
        assert_eq!(shard.zrange("z", 0, -1).unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn zadd_same_score_is_a_noop_but_rescore_counts_as_added() {
        let mut shard = Shard::new(4);
        assert!(shard.zadd("z", 1.0, "a").unwrap());
        assert!(!shard.zadd("z", 1.0, "a").unwrap());
        assert!(shard.zadd("z", 2.0, "a").unwrap());
        assert_eq!(shard.zscore("z", "a").unwrap(), Some(2.0));
    }

    #[test]
    fn zrem_removes_multiple_members_in_one_call() {
        let mut shard = Shard::new(4);
        shard.zadd("z", 1.0, "a").unwrap();
        shard.zadd("z", 2.0, "b").unwrap();
        shard.zadd("z", 3.0, "c").unwrap();
        assert_eq!(
            shard.zrem("z", &["a".to_string(), "b".to_string(), "c".to_string()]).unwrap(),
            3
        );
        assert_eq!(shard.exists(&["z".to_string()]), 0);
    }

    #[test]
    fn zrem_last_member_drops_the_key() {
        let mut shard = Shard::new(4);
        shard.zadd("z", 1.0, "a").unwrap();
        shard.zrem("z", &["a".to_string()]).unwrap();
        assert_eq!(shard.zcard("z").unwrap(), 0);
        assert_eq!(shard.exists(&["z".to_string()]), 0);
    }

    #[test]
    fn cms_incrby_requires_an_existing_key() {
        let mut shard = Shard::new(8);
        assert_eq!(shard.cms_incrby("missing", "x", 1), Err(KvError::CmsKeyMissing));
    }

    #[test]
    fn cms_init_is_idempotent_false_on_existing_key() {
        let mut shard = Shard::new(8);
        assert!(shard.cms_init_by_dim("c", 16, 3).unwrap());
        assert!(!shard.cms_init_by_dim("c", 16, 3).unwrap());
    }

    #[test]
    fn cms_init_against_a_non_cms_key_is_wrongtype() {
        let mut shard = Shard::new(8);
        shard.set("k", "v", None);
        assert_eq!(shard.cms_init_by_dim("k", 16, 3), Err(KvError::WrongType));
        assert_eq!(shard.cms_init_by_prob("k", 0.01, 0.01), Err(KvError::WrongType));
    }
}
