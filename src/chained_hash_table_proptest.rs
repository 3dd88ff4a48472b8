#![cfg(test)]

// Property tests for ChainedHashTable kept inside the crate so they can look
// at the release policy and the load-factor internals together.

use crate::chained_hash_table::ChainedHashTable;
use crate::error::ContainerError;
use crate::keys::{FnKeyOps, KeyOps, StdKeyOps};
use crate::release::{Release, ReleaseFn};
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations so shrinking moves toward earlier keys and shorter
// op lists.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Remove(usize),
    Take(usize),
    Get(usize),
    Contains(String),
    Mutate(usize, i32),
    Foreach(usize),
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=12).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            2 => idx.clone().prop_map(Op::Remove),
            1 => idx.clone().prop_map(Op::Take),
            2 => idx.clone().prop_map(Op::Get),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(Op::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => (0usize..6).prop_map(Op::Foreach),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Record of everything the release policy has seen.
#[derive(Default)]
struct Released {
    keys: Vec<Key>,
    values: Vec<i32>,
}

fn spy() -> (impl Release<Key, i32>, Rc<RefCell<Released>>) {
    let log = Rc::new(RefCell::new(Released::default()));
    let (lk, lv) = (log.clone(), log.clone());
    let release = ReleaseFn::new(
        move |k: Key| lk.borrow_mut().keys.push(k),
        move |v: i32| lv.borrow_mut().values.push(v),
    );
    (release, log)
}

fn run_state_machine<O>(ops_policy: O, pool: Vec<String>, ops: Vec<Op>) -> Result<(), TestCaseError>
where
    O: KeyOps<Key> + KeyOps<str>,
{
    let (release, released) = spy();
    let mut sut = ChainedHashTable::with_capacity_and_ops(2, ops_policy, release).unwrap();
    let initial_capacity = sut.capacity();
    let mut model: HashMap<Key, i32> = HashMap::new();
    // Values that left the model through release, in order.
    let mut expect_values: Vec<i32> = Vec::new();
    let mut expect_keys: usize = 0;

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_from(&pool, i);
                let before = sut.len();
                sut.insert(k.clone(), v).unwrap();
                if let Some(old) = model.insert(k, v) {
                    // Overwrite: incoming key and old value released.
                    expect_values.push(old);
                    expect_keys += 1;
                    prop_assert_eq!(sut.len(), before);
                }
            }
            Op::Remove(i) => {
                let k = key_from(&pool, i);
                match model.remove(&k) {
                    Some(v) => {
                        prop_assert_eq!(sut.remove(&k), Ok(()));
                        expect_values.push(v);
                        expect_keys += 1;
                    }
                    None => prop_assert_eq!(sut.remove(&k), Err(ContainerError::NotFound)),
                }
                prop_assert!(sut.get(&k).is_none());
            }
            Op::Take(i) => {
                let k = key_from(&pool, i);
                let got = sut.take(&k);
                let want = model.remove(&k).map(|v| (k.clone(), v));
                prop_assert_eq!(got, want);
            }
            Op::Get(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.get(&k), model.get(&k));
            }
            Op::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            Op::Mutate(i, d) => {
                let k = key_from(&pool, i);
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.wrapping_add(d);
                }
                if let Some(v) = model.get_mut(&k) {
                    *v = v.wrapping_add(d);
                }
            }
            Op::Foreach(limit) => {
                let mut seen = Vec::new();
                let visited = sut.foreach(limit, |k, _| seen.push(k.clone()));
                let bound = if limit == 0 { model.len() } else { limit.min(model.len()) };
                prop_assert_eq!(visited, bound);
                prop_assert_eq!(seen.len(), bound);
                let all: BTreeSet<Key> = sut.iter().map(|(k, _)| k.clone()).collect();
                let want: BTreeSet<Key> = model.keys().cloned().collect();
                prop_assert_eq!(all, want);
            }
            Op::Clear => {
                let mut drained: Vec<i32> = model.drain().map(|(_, v)| v).collect();
                expect_keys += drained.len();
                let start = released.borrow().values.len();
                sut.clear();
                let mut got = released.borrow().values[start..].to_vec();
                got.sort();
                drained.sort();
                prop_assert_eq!(got, drained.clone());
                expect_values.extend(released.borrow().values[start..].iter().copied());
            }
        }

        // Post-conditions after each op.
        prop_assert_eq!(sut.len(), model.len());
        prop_assert!(sut.load_factor() <= sut.max_load_factor());
        prop_assert_eq!(sut.capacity() % initial_capacity, 0);
        prop_assert!((sut.capacity() / initial_capacity).is_power_of_two());
        prop_assert_eq!(&released.borrow().values, &expect_values);
        prop_assert_eq!(released.borrow().keys.len(), expect_keys);
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - Overwrite keeps one entry and releases exactly the incoming key and the
//   replaced value.
// - remove releases once; take returns ownership and releases nothing.
// - foreach honours its limit; iter yields the model's key set.
// - After every op: len parity, load factor bound, capacity is the initial
//   capacity times a power of two.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let ops_policy: StdKeyOps = StdKeyOps::default();
        run_state_machine(ops_policy, pool, ops)?;
    }
}

// Same invariants with every key hashed to one bucket, so chains grow long
// and equality alone resolves lookups.
#[derive(Clone, Default)]
struct OneBucket;
impl KeyOps<Key> for OneBucket {
    fn hash_key(&self, _key: &Key) -> u64 {
        0
    }
    fn key_eq(&self, a: &Key, b: &Key) -> bool {
        a == b
    }
}
impl KeyOps<str> for OneBucket {
    fn hash_key(&self, _key: &str) -> u64 {
        0
    }
    fn key_eq(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_state_machine(OneBucket, pool, ops)?;
    }
}

// Property: N distinct keys into a tiny table are all retrievable regardless
// of how many resizes happen, under an explicit hash function.
proptest! {
    #[test]
    fn prop_resize_keeps_every_entry(keys in proptest::collection::btree_set(any::<u64>(), 0..400)) {
        let ops = FnKeyOps::new(|k: &u64| k.rotate_left(17), |a: &u64, b: &u64| a == b);
        let mut t = ChainedHashTable::with_capacity_and_ops(1, ops, crate::release::Dropping).unwrap();
        for &k in &keys {
            t.insert(k, !k).unwrap();
        }
        prop_assert_eq!(t.len(), keys.len());
        for &k in &keys {
            prop_assert_eq!(t.get(&k), Some(&!k));
        }
        prop_assert!(t.capacity().is_power_of_two());
    }
}
