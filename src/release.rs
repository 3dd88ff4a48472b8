//! Release policies: what a container does with keys and values it gives up.
//!
//! Every key and value moved into a container leaves it exactly once. Either
//! the caller takes it back (`take`), or the container hands it to its
//! `Release` policy on overwrite, removal, clear, or drop. The policy is the
//! single place where ownership ends.
//!
//! Owning containers use [`Dropping`], which simply drops. A container that
//! should never dispose of caller data stores references (`&'a K`, `&'a V`)
//! instead; dropping a reference is a no-op, so the distinction is made by
//! the key/value types rather than by a runtime check.

/// Disposal of keys and values that leave a container.
pub trait Release<K, V> {
    #[inline]
    fn release_key(&mut self, key: K) {
        drop(key);
    }

    #[inline]
    fn release_value(&mut self, value: V) {
        drop(value);
    }

    /// Release a whole entry. Defaults to key then value.
    #[inline]
    fn release_entry(&mut self, key: K, value: V) {
        self.release_key(key);
        self.release_value(value);
    }
}

/// Drop released keys and values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dropping;

impl<K, V> Release<K, V> for Dropping {}

/// Separate callbacks for keys and values.
///
/// Pass `drop` for a half that needs no special handling.
pub struct ReleaseFn<FK, FV> {
    key: FK,
    value: FV,
}

impl<FK, FV> ReleaseFn<FK, FV> {
    pub fn new(key: FK, value: FV) -> Self {
        Self { key, value }
    }
}

impl<K, V, FK, FV> Release<K, V> for ReleaseFn<FK, FV>
where
    FK: FnMut(K),
    FV: FnMut(V),
{
    #[inline]
    fn release_key(&mut self, key: K) {
        (self.key)(key)
    }

    #[inline]
    fn release_value(&mut self, value: V) {
        (self.value)(value)
    }
}

/// One callback receiving both halves of an entry.
///
/// A key or value released on its own (hash-table or list overwrite) is
/// dropped without reaching the callback.
pub struct PairRelease<F> {
    f: F,
}

impl<F> PairRelease<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<K, V, F> Release<K, V> for PairRelease<F>
where
    F: FnMut(K, V),
{
    #[inline]
    fn release_entry(&mut self, key: K, value: V) {
        (self.f)(key, value)
    }
}
