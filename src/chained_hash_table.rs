//! ChainedHashTable: separate chaining over an entry arena.
//!
//! Entries live in a `SlotMap` and never move once inserted; bucket heads and
//! chain links are arena keys. Growing the table allocates a new bucket array
//! and relinks every entry into it, so entries are neither copied nor
//! reallocated. Each entry keeps its 64-bit hash, which means relinking never
//! calls back into the key policy.

use crate::config::HashTableConfig;
use crate::error::{ContainerError, Result};
use crate::keys::{KeyOps, StdKeyOps};
use crate::reentrancy::BusyFlag;
use crate::release::{Dropping, Release};
use core::borrow::Borrow;
use core::fmt;
use core::hash::Hash;
use core::iter::FusedIterator;
use slotmap::{DefaultKey, SlotMap};

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
    next: Option<DefaultKey>,
}

/// Bucket array plus entry arena. Knows nothing about key policies; callers
/// pass the hash and a match predicate.
struct Chains<K, V> {
    buckets: Vec<Option<DefaultKey>>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
}

fn alloc_buckets(capacity: usize) -> Result<Vec<Option<DefaultKey>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(capacity)
        .map_err(|_| ContainerError::allocation(capacity))?;
    buckets.resize(capacity, None);
    Ok(buckets)
}

impl<K, V> Chains<K, V> {
    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    fn find(&self, hash: u64, mut is_match: impl FnMut(&K) -> bool) -> Option<DefaultKey> {
        let mut cur = self.buckets[self.bucket_of(hash)];
        while let Some(slot) = cur {
            let entry = &self.slots[slot];
            if entry.hash == hash && is_match(&entry.key) {
                return Some(slot);
            }
            cur = entry.next;
        }
        None
    }

    /// Link a new entry at the head of its chain.
    fn link(&mut self, key: K, value: V, hash: u64) {
        let bucket = self.bucket_of(hash);
        let next = self.buckets[bucket];
        let slot = self.slots.insert(Entry {
            key,
            value,
            hash,
            next,
        });
        self.buckets[bucket] = Some(slot);
    }

    fn unlink(&mut self, hash: u64, mut is_match: impl FnMut(&K) -> bool) -> Option<Entry<K, V>> {
        let bucket = self.bucket_of(hash);
        let mut prev: Option<DefaultKey> = None;
        let mut cur = self.buckets[bucket];
        while let Some(slot) = cur {
            let entry = &self.slots[slot];
            if entry.hash == hash && is_match(&entry.key) {
                let next = entry.next;
                match prev {
                    Some(p) => self.slots[p].next = next,
                    None => self.buckets[bucket] = next,
                }
                return self.slots.remove(slot);
            }
            prev = cur;
            cur = entry.next;
        }
        None
    }

    /// Bucket count that keeps `len + 1` entries within `max_load`, doubling
    /// from the current capacity. `None` if it does not fit in `usize`.
    fn capacity_for_insert(&self, max_load: f64) -> Option<usize> {
        let wanted = (self.slots.len() + 1) as f64;
        let mut capacity = self.buckets.len();
        while wanted > capacity as f64 * max_load {
            capacity = capacity.checked_mul(2)?;
        }
        Some(capacity)
    }

    /// Move every entry into a fresh bucket array of `new_capacity`.
    ///
    /// On allocation failure the current buckets are untouched.
    fn rehash(&mut self, new_capacity: usize) -> Result<()> {
        let mut buckets = alloc_buckets(new_capacity)?;
        let old_capacity = self.buckets.len();
        for head in core::mem::take(&mut self.buckets) {
            let mut cur = head;
            while let Some(slot) = cur {
                let entry = &mut self.slots[slot];
                cur = entry.next;
                let bucket = (entry.hash % new_capacity as u64) as usize;
                entry.next = buckets[bucket];
                buckets[bucket] = Some(slot);
            }
        }
        self.buckets = buckets;
        log::debug!(
            "hash table resized {} -> {} buckets ({} entries relinked)",
            old_capacity,
            new_capacity,
            self.slots.len()
        );
        Ok(())
    }

    /// Empty the structure and return the detached entries.
    fn detach_all(&mut self) -> SlotMap<DefaultKey, Entry<K, V>> {
        self.buckets.iter_mut().for_each(|b| *b = None);
        core::mem::take(&mut self.slots)
    }
}

/// Unordered key/value table with separate chaining and doubling resize.
///
/// `O` supplies hashing and equality (see [`KeyOps`]); `R` disposes of keys
/// and values the table gives up (see [`Release`]).
pub struct ChainedHashTable<K, V, O = StdKeyOps, R = Dropping>
where
    R: Release<K, V>,
{
    chains: Chains<K, V>,
    ops: O,
    release: R,
    max_load_factor: f64,
    busy: BusyFlag,
}

impl<K, V> ChainedHashTable<K, V>
where
    K: Eq + Hash,
{
    /// Empty table with the default bucket count and load factor.
    pub fn new() -> Self {
        let config = HashTableConfig::default();
        Self {
            chains: Chains {
                buckets: vec![None; config.effective_capacity()],
                slots: SlotMap::new(),
            },
            ops: StdKeyOps::default(),
            release: Dropping,
            max_load_factor: config.max_load_factor,
            busy: BusyFlag::new(),
        }
    }

    /// Empty table with `capacity` buckets (0 selects the default).
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_ops(capacity, StdKeyOps::default(), Dropping)
    }
}

impl<K, V> Default for ChainedHashTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, O, R> ChainedHashTable<K, V, O, R>
where
    R: Release<K, V>,
{
    /// Empty table with `capacity` buckets (0 selects the default), the given
    /// key policy and release policy.
    pub fn with_capacity_and_ops(capacity: usize, ops: O, release: R) -> Result<Self> {
        Self::with_config(
            HashTableConfig::default().initial_capacity(capacity),
            ops,
            release,
        )
    }

    pub fn with_config(config: HashTableConfig, ops: O, release: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chains: Chains {
                buckets: alloc_buckets(config.effective_capacity())?,
                slots: SlotMap::new(),
            },
            ops,
            release,
            max_load_factor: config.max_load_factor,
            busy: BusyFlag::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.chains.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.slots.is_empty()
    }

    /// Current bucket count.
    pub fn capacity(&self) -> usize {
        self.chains.buckets.len()
    }

    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Insert or overwrite.
    ///
    /// When `key` is already present the stored key and its chain position
    /// are kept: the incoming `key` and the previous value are released and
    /// `value` takes the old value's place. Otherwise the table grows first if
    /// the new entry would push it past its load factor.
    ///
    /// Fails with [`ContainerError::AllocationFailure`] when a required
    /// resize cannot allocate; the table is then unchanged and `key`/`value`
    /// are dropped without reaching the release policy.
    pub fn insert(&mut self, key: K, value: V) -> Result<()>
    where
        O: KeyOps<K>,
    {
        let replaced = {
            let _g = self.busy.enter();
            let hash = self.ops.hash_key(&key);
            let ops = &self.ops;
            match self.chains.find(hash, |k| ops.key_eq(k, &key)) {
                Some(slot) => {
                    let entry = &mut self.chains.slots[slot];
                    let old = core::mem::replace(&mut entry.value, value);
                    Some((key, old))
                }
                None => {
                    let capacity = self
                        .chains
                        .capacity_for_insert(self.max_load_factor)
                        .ok_or_else(|| ContainerError::allocation(usize::MAX))?;
                    if capacity != self.chains.buckets.len() {
                        self.chains.rehash(capacity)?;
                    }
                    self.chains.link(key, value, hash);
                    None
                }
            }
        };
        if let Some((incoming, old)) = replaced {
            self.release.release_key(incoming);
            self.release.release_value(old);
        }
        Ok(())
    }

    fn find<Q>(&self, key: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        let _g = self.busy.enter();
        let hash = self.ops.hash_key(key);
        self.chains
            .find(hash, |k| self.ops.key_eq(k.borrow(), key))
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        let slot = self.find(key)?;
        Some(&self.chains.slots[slot].value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        let slot = self.find(key)?;
        Some(&mut self.chains.slots[slot].value)
    }

    /// Stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        let slot = self.find(key)?;
        let entry = &self.chains.slots[slot];
        Some((&entry.key, &entry.value))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        self.find(key).is_some()
    }

    /// Unlink `key` and hand the returned pair back to the caller. The release
    /// policy is not involved.
    pub fn take<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        let _g = self.busy.enter();
        let hash = self.ops.hash_key(key);
        let ops = &self.ops;
        self.chains
            .unlink(hash, |k| ops.key_eq(k.borrow(), key))
            .map(|e| (e.key, e.value))
    }

    /// Unlink `key` and release its key and value.
    pub fn remove<Q>(&mut self, key: &Q) -> Result<()>
    where
        K: Borrow<Q>,
        O: KeyOps<Q>,
        Q: ?Sized,
    {
        let (k, v) = self.take(key).ok_or(ContainerError::NotFound)?;
        self.release.release_entry(k, v);
        Ok(())
    }

    /// Release every entry. The bucket count is kept.
    pub fn clear(&mut self) {
        let detached = self.chains.detach_all();
        for (_, entry) in detached {
            self.release.release_entry(entry.key, entry.value);
        }
    }

    /// Entries in bucket order, then chain order. The order is unrelated to
    /// insertion order and changes when the table resizes.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.chains.buckets.iter(),
            slots: &self.chains.slots,
            cur: None,
            remaining: self.chains.slots.len(),
        }
    }

    /// Call `f` for at most `limit` entries (0 = all) in [`iter`](Self::iter)
    /// order. Returns the number of entries visited.
    pub fn foreach<F>(&self, limit: usize, mut f: F) -> usize
    where
        F: FnMut(&K, &V),
    {
        let mut visited = 0;
        for (k, v) in self.iter().take(crate::visit_limit(limit)) {
            f(k, v);
            visited += 1;
        }
        visited
    }
}

impl<K, V, O, R> Drop for ChainedHashTable<K, V, O, R>
where
    R: Release<K, V>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, O, R> fmt::Debug for ChainedHashTable<K, V, O, R>
where
    K: fmt::Debug,
    V: fmt::Debug,
    R: Release<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over `ChainedHashTable` entries.
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Option<DefaultKey>>,
    slots: &'a SlotMap<DefaultKey, Entry<K, V>>,
    cur: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(slot) = self.cur {
                let entry = &self.slots[slot];
                self.cur = entry.next;
                self.remaining -= 1;
                return Some((&entry.key, &entry.value));
            }
            self.cur = *self.buckets.next()?;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<'a, K, V, O, R> IntoIterator for &'a ChainedHashTable<K, V, O, R>
where
    R: Release<K, V>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::ChainedHashTable;
    use crate::config::HashTableConfig;
    use crate::error::ContainerError;
    use crate::keys::{FnKeyOps, StdKeyOps};
    use crate::release::{Dropping, Release, ReleaseFn};
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn spy_table(
        capacity: usize,
    ) -> (
        ChainedHashTable<String, i32, StdKeyOps, impl Release<String, i32>>,
        Rc<RefCell<Vec<String>>>,
        Rc<RefCell<Vec<i32>>>,
    ) {
        let keys = Rc::new(RefCell::new(Vec::new()));
        let values = Rc::new(RefCell::new(Vec::new()));
        let (k2, v2) = (keys.clone(), values.clone());
        let release = ReleaseFn::new(
            move |k: String| k2.borrow_mut().push(k),
            move |v: i32| v2.borrow_mut().push(v),
        );
        let t = ChainedHashTable::with_capacity_and_ops(capacity, StdKeyOps::default(), release)
            .unwrap();
        (t, keys, values)
    }

    /// Invariant: overwriting keeps one entry, the latest value wins, and the
    /// incoming duplicate key plus the replaced value are released.
    #[test]
    fn overwrite_releases_incoming_key_and_old_value() {
        let (mut t, keys, values) = spy_table(8);
        t.insert("k".to_string(), 1).unwrap();
        t.insert("k".to_string(), 2).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("k"), Some(&2));
        assert_eq!(*keys.borrow(), vec!["k".to_string()]);
        assert_eq!(*values.borrow(), vec![1]);
    }

    /// Invariant: removal releases key and value exactly once and the key is
    /// gone afterwards; a second removal reports NotFound.
    #[test]
    fn remove_releases_once() {
        let (mut t, keys, values) = spy_table(8);
        t.insert("a".to_string(), 1).unwrap();
        t.insert("b".to_string(), 2).unwrap();
        assert_eq!(t.remove("a"), Ok(()));
        assert_eq!(t.remove("a"), Err(ContainerError::NotFound));
        assert_eq!(t.get("a"), None);
        assert_eq!(*keys.borrow(), vec!["a".to_string()]);
        assert_eq!(*values.borrow(), vec![1]);
        assert_eq!(t.len(), 1);
    }

    /// Invariant: `take` returns ownership without involving the release policy.
    #[test]
    fn take_bypasses_release() {
        let (mut t, keys, values) = spy_table(8);
        t.insert("a".to_string(), 1).unwrap();
        assert_eq!(t.take("a"), Some(("a".to_string(), 1)));
        assert_eq!(t.take("a"), None);
        assert!(keys.borrow().is_empty());
        assert!(values.borrow().is_empty());
    }

    /// Invariant: `clear` and drop release every remaining entry once.
    #[test]
    fn clear_and_drop_release_everything() {
        let (mut t, keys, values) = spy_table(4);
        for i in 0..10 {
            t.insert(format!("k{i}"), i).unwrap();
        }
        let capacity = t.capacity();
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.capacity(), capacity);
        assert_eq!(values.borrow().len(), 10);

        t.insert("late".to_string(), 99).unwrap();
        drop(t);
        assert_eq!(keys.borrow().len(), 11);
        let mut seen = values.borrow().clone();
        seen.sort();
        assert_eq!(seen, (0..10).chain([99]).collect::<Vec<_>>());
    }

    /// Invariant: growth doubles from the initial capacity, keeps the load
    /// factor bound after every insert, and loses no entries.
    #[test]
    fn growth_preserves_entries_and_load_bound() {
        let mut t: ChainedHashTable<u32, u32> = ChainedHashTable::with_capacity(3).unwrap();
        for i in 0..500u32 {
            t.insert(i, i * 10).unwrap();
            assert!(t.load_factor() <= t.max_load_factor());
            let ratio = t.capacity() / 3;
            assert_eq!(t.capacity() % 3, 0);
            assert!(ratio.is_power_of_two());
        }
        assert_eq!(t.len(), 500);
        for i in 0..500u32 {
            assert_eq!(t.get(&i), Some(&(i * 10)));
        }
    }

    /// Invariant: an overwrite never triggers growth.
    #[test]
    fn overwrite_does_not_grow() {
        let mut t: ChainedHashTable<u32, u32> = ChainedHashTable::with_capacity(4).unwrap();
        for i in 0..3 {
            t.insert(i, i).unwrap();
        }
        assert_eq!(t.capacity(), 4);
        t.insert(2, 20).unwrap();
        assert_eq!(t.capacity(), 4);
        t.insert(3, 3).unwrap();
        assert_eq!(t.capacity(), 8);
    }

    /// Invariant: every key lands in one chain; under a constant hash all
    /// entries share a bucket and equality alone separates them.
    #[test]
    fn constant_hash_collisions_resolve_by_equality() {
        let ops = FnKeyOps::new(|_: &String| 0u64, |a: &String, b: &String| a == b);
        let mut t = ChainedHashTable::with_capacity_and_ops(2, ops, Dropping).unwrap();
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            t.insert(k.to_string(), i).unwrap();
        }
        assert_eq!(t.get(&"c".to_string()), Some(&2));
        t.remove(&"b".to_string()).unwrap();
        assert_eq!(t.get(&"b".to_string()), None);
        assert_eq!(t.get(&"d".to_string()), Some(&3));
        assert_eq!(t.len(), 3);
    }

    /// Invariant: `foreach` stops at `limit`; 0 means unbounded. `iter`
    /// yields every entry once.
    #[test]
    fn foreach_respects_limit() {
        let mut t: ChainedHashTable<u32, ()> = ChainedHashTable::with_capacity(16).unwrap();
        for i in 0..10 {
            t.insert(i, ()).unwrap();
        }
        let mut calls = 0;
        assert_eq!(t.foreach(3, |_, _| calls += 1), 3);
        assert_eq!(calls, 3);
        assert_eq!(t.foreach(0, |_, _| {}), 10);
        assert_eq!(t.foreach(50, |_, _| {}), 10);
        let keys: BTreeSet<u32> = t.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..10).collect());
        assert_eq!(t.iter().len(), 10);
    }

    /// Invariant: within a bucket, new entries are linked at the chain head.
    #[test]
    fn chain_order_is_most_recent_first() {
        let ops = FnKeyOps::new(|_: &u8| 7u64, |a: &u8, b: &u8| a == b);
        let mut t = ChainedHashTable::with_capacity_and_ops(16, ops, Dropping).unwrap();
        for k in [1u8, 2, 3] {
            t.insert(k, ()).unwrap();
        }
        let order: Vec<u8> = t.iter().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn oversized_capacity_reports_allocation_failure() {
        let r = ChainedHashTable::<u32, u32>::with_capacity(usize::MAX);
        assert!(matches!(r, Err(ContainerError::AllocationFailure { .. })));
    }

    /// Invariant: an insert whose resize cannot allocate fails, leaves the
    /// table as it was, and never hands its arguments to the release policy.
    #[test]
    fn failed_resize_leaves_table_untouched() {
        let released = Rc::new(RefCell::new(0usize));
        let (rk, rv) = (released.clone(), released.clone());
        let release = ReleaseFn::new(
            move |_k: u64| *rk.borrow_mut() += 1,
            move |_v: u64| *rv.borrow_mut() += 1,
        );
        // Any single entry demands about 2^57 buckets at this load factor.
        let config = HashTableConfig::default()
            .initial_capacity(4)
            .max_load_factor(1e-17);
        let ops: StdKeyOps = StdKeyOps::default();
        let mut t = ChainedHashTable::with_config(config, ops, release).unwrap();
        let r = t.insert(7, 70);
        assert!(matches!(r, Err(ContainerError::AllocationFailure { .. })));
        assert_eq!(t.len(), 0);
        assert_eq!(t.capacity(), 4);
        assert_eq!(t.get(&7), None);
        drop(t);
        assert_eq!(*released.borrow(), 0);
    }

    #[test]
    fn invalid_load_factor_is_rejected() {
        let config = HashTableConfig::default().max_load_factor(0.0);
        let r = ChainedHashTable::<u32, u32>::with_config(config, StdKeyOps::default(), Dropping);
        assert!(matches!(r, Err(ContainerError::InvalidArgument(_))));
    }

    #[test]
    fn get_mut_and_get_key_value() {
        let mut t: ChainedHashTable<String, i32> = ChainedHashTable::new();
        t.insert("x".to_string(), 1).unwrap();
        *t.get_mut("x").unwrap() += 41;
        assert_eq!(t.get_key_value("x"), Some((&"x".to_string(), &42)));
        assert!(t.contains_key("x"));
        assert!(!t.contains_key("y"));
        assert_eq!(format!("{:?}", t), r#"{"x": 42}"#);
    }

    /// Invariant (debug-only): re-entering the table from the equality policy
    /// during a lookup panics.
    #[cfg(debug_assertions)]
    #[test]
    fn reentry_from_equality_panics() {
        type Table = ChainedHashTable<u32, u32, FnKeyOps<fn(&u32) -> u64, Box<dyn Fn(&u32, &u32) -> bool>>>;
        let target: Rc<RefCell<*const Table>> = Rc::new(RefCell::new(core::ptr::null()));
        let t2 = target.clone();
        let eq: Box<dyn Fn(&u32, &u32) -> bool> = Box::new(move |a, b| {
            let p = *t2.borrow();
            if !p.is_null() {
                // Reach back into the table mid-lookup.
                unsafe {
                    let _ = (*p).contains_key(&0);
                }
            }
            a == b
        });
        let hash: fn(&u32) -> u64 = |_| 0;
        let mut t: Table =
            ChainedHashTable::with_capacity_and_ops(4, FnKeyOps::new(hash, eq), Dropping).unwrap();
        t.insert(1, 1).unwrap();
        *target.borrow_mut() = &t as *const Table;
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = t.get(&2);
        }));
        *target.borrow_mut() = core::ptr::null();
        assert!(res.is_err(), "expected re-entry to panic in debug builds");
    }
}
