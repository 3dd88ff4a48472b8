//! Key policies: hashing/equality for the hash table and three-way ordering
//! for the sorted containers.
//!
//! Policies are stored by value inside a container and fixed for its
//! lifetime. Lookups are generic over a borrowed form `Q` of the stored key,
//! so a policy that implements `KeyOps<str>` lets a `String`-keyed table be
//! queried with `&str`.

use core::cmp::Ordering;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;

/// Hashing and equality for keys of (borrowed) type `Q`.
///
/// Must be consistent: `key_eq(a, b)` implies `hash_key(a) == hash_key(b)`.
pub trait KeyOps<Q: ?Sized> {
    fn hash_key(&self, key: &Q) -> u64;
    fn key_eq(&self, a: &Q, b: &Q) -> bool;
}

/// `Hash + Eq` keys hashed with a `BuildHasher`.
#[derive(Debug, Clone, Default)]
pub struct StdKeyOps<S = DefaultHashBuilder> {
    hasher: S,
}

impl<S> StdKeyOps<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }
}

impl<Q, S> KeyOps<Q> for StdKeyOps<S>
where
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn hash_key(&self, key: &Q) -> u64 {
        self.hasher.hash_one(key)
    }

    #[inline]
    fn key_eq(&self, a: &Q, b: &Q) -> bool {
        a == b
    }
}

/// Hash and equality supplied as two closures.
#[derive(Clone)]
pub struct FnKeyOps<H, E> {
    hash: H,
    eq: E,
}

impl<H, E> FnKeyOps<H, E> {
    pub fn new(hash: H, eq: E) -> Self {
        Self { hash, eq }
    }
}

impl<K, H, E> KeyOps<K> for FnKeyOps<H, E>
where
    K: ?Sized,
    H: Fn(&K) -> u64,
    E: Fn(&K, &K) -> bool,
{
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        (self.hash)(key)
    }

    #[inline]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        (self.eq)(a, b)
    }
}

/// Three-way comparison for keys of (borrowed) type `Q`.
///
/// `compare` must be a total order for the sortedness guarantees to hold.
pub trait KeyOrder<Q: ?Sized> {
    fn compare(&self, a: &Q, b: &Q) -> Ordering;

    /// Magnitude of the difference between `a` and `b`.
    ///
    /// Only a hint: the sorted list uses it to pick the end an insertion walk
    /// starts from. Orders without a meaningful distance return 0.
    #[inline]
    fn distance(&self, _a: &Q, _b: &Q) -> u64 {
        0
    }
}

/// The key's own `Ord`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<Q: ?Sized + Ord> KeyOrder<Q> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &Q, b: &Q) -> Ordering {
        a.cmp(b)
    }
}

/// Integer ordering that also reports the numeric gap between keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericOrder;

impl<T> KeyOrder<T> for NumericOrder
where
    T: Ord + Copy + Into<i128>,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }

    #[inline]
    fn distance(&self, a: &T, b: &T) -> u64 {
        let gap = (*a).into() - (*b).into();
        u64::try_from(gap.unsigned_abs()).unwrap_or(u64::MAX)
    }
}

impl<K, F> KeyOrder<K> for F
where
    K: ?Sized,
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}
