//! SortedVec: array-backed key/value sequence with an explicit sorted flag.
//!
//! Elements are kept in insertion order until `sort_stable` runs. The flag
//! records whether the current order is known to be sorted; every structural
//! mutation clears it, and `binary_search` refuses to probe unless it is set.
//!
//! Sorting is a bottom-up merge sort over a permutation of element indices,
//! using an auxiliary index buffer of the same length. Merges prefer the left
//! run on ties, which makes the sort stable. The finished permutation is then
//! applied in place by following its cycles.

use crate::config::SortedVecConfig;
use crate::error::{ContainerError, Result};
use crate::keys::{KeyOrder, NaturalOrder};
use crate::reentrancy::BusyFlag;
use crate::release::{Dropping, Release};
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::iter::FusedIterator;

struct Element<K, V> {
    key: K,
    value: V,
}

/// Key/value vector that is sorted on demand.
///
/// Keys need not be unique; equal keys keep their relative order across
/// `sort_stable`.
pub struct SortedVec<K, V, C = NaturalOrder, R = Dropping>
where
    R: Release<K, V>,
{
    elements: Vec<Element<K, V>>,
    growth_factor: usize,
    sorted: bool,
    order: C,
    release: R,
    busy: BusyFlag,
}

impl<K: Ord, V> SortedVec<K, V> {
    /// Empty vector with room for `initial_capacity` elements (must be > 0).
    pub fn new(initial_capacity: usize) -> Result<Self> {
        Self::with_capacity_and_order(initial_capacity, NaturalOrder, Dropping)
    }
}

impl<K, V, C, R> SortedVec<K, V, C, R>
where
    R: Release<K, V>,
{
    pub fn with_capacity_and_order(initial_capacity: usize, order: C, release: R) -> Result<Self> {
        Self::with_config(
            SortedVecConfig::default().initial_capacity(initial_capacity),
            order,
            release,
        )
    }

    pub fn with_config(config: SortedVecConfig, order: C, release: R) -> Result<Self> {
        config.validate()?;
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(config.initial_capacity)
            .map_err(|_| ContainerError::allocation(config.initial_capacity))?;
        Ok(Self {
            elements,
            growth_factor: config.growth_factor,
            sorted: false,
            order,
            release,
            busy: BusyFlag::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.elements.capacity()
    }

    /// Whether the current element order is known to be sorted.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Make room for one more element, multiplying the capacity by the growth
    /// factor when full.
    fn reserve_one(&mut self) -> Result<()> {
        let len = self.elements.len();
        let capacity = self.elements.capacity();
        if len < capacity {
            return Ok(());
        }
        let target = capacity
            .checked_mul(self.growth_factor)
            .ok_or_else(|| ContainerError::allocation(usize::MAX))?;
        self.elements
            .try_reserve_exact(target - len)
            .map_err(|_| ContainerError::allocation(target))?;
        log::trace!("vector grew {} -> {} slots", capacity, self.elements.capacity());
        Ok(())
    }

    /// Append without regard to order. Clears the sorted flag.
    pub fn push_back(&mut self, key: K, value: V) -> Result<()> {
        self.reserve_one()?;
        self.elements.push(Element { key, value });
        self.sorted = false;
        Ok(())
    }

    /// Insert directly after position `index`, shifting later elements right.
    /// Clears the sorted flag.
    pub fn insert_after(&mut self, index: usize, key: K, value: V) -> Result<()> {
        let len = self.elements.len();
        if index >= len {
            return Err(ContainerError::out_of_range(index, len));
        }
        self.reserve_one()?;
        self.elements.insert(index + 1, Element { key, value });
        self.sorted = false;
        Ok(())
    }

    /// Remove the element at `index` and return it without releasing it.
    pub fn take(&mut self, index: usize) -> Option<(K, V)> {
        if index >= self.elements.len() {
            return None;
        }
        let e = self.elements.remove(index);
        self.sorted = false;
        Some((e.key, e.value))
    }

    /// Remove and release the element at `index`, shifting later elements
    /// left. Clears the sorted flag.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        let len = self.elements.len();
        let (k, v) = self
            .take(index)
            .ok_or_else(|| ContainerError::out_of_range(index, len))?;
        self.release.release_entry(k, v);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<(&K, &V)> {
        self.elements.get(index).map(|e| (&e.key, &e.value))
    }

    /// Keys are not reachable mutably; changing one could break the order.
    pub fn get_mut(&mut self, index: usize) -> Option<(&K, &mut V)> {
        self.elements.get_mut(index).map(|e| (&e.key, &mut e.value))
    }

    /// Release every element. Capacity is kept; the sorted flag is cleared.
    pub fn clear(&mut self) {
        let mut detached = core::mem::take(&mut self.elements);
        self.sorted = false;
        for e in detached.drain(..) {
            self.release.release_entry(e.key, e.value);
        }
        // Hand the emptied buffer back to keep its capacity.
        self.elements = detached;
    }

    /// Stable in-place sort by key. Sets the sorted flag.
    ///
    /// Fails with [`ContainerError::AllocationFailure`] if the index buffers
    /// cannot be allocated; the vector is then unchanged.
    pub fn sort_stable(&mut self) -> Result<()>
    where
        C: KeyOrder<K>,
    {
        let _g = self.busy.enter();
        let n = self.elements.len();
        if n < 2 {
            self.sorted = true;
            return Ok(());
        }
        let mut perm = index_buffer(n)?;
        perm.extend(0..n);
        let mut aux = index_buffer(n)?;
        aux.resize(n, 0);

        merge_sort_indices(&self.elements, &self.order, &mut perm, &mut aux);
        apply_permutation(&mut self.elements, &mut perm);
        self.sorted = true;
        log::debug!("vector sorted ({} elements)", n);
        Ok(())
    }

    fn bisect<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let _g = self.busy.enter();
        let (mut lo, mut hi) = (0, self.elements.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.order.compare(key, self.elements[mid].key.borrow()) {
                Ordering::Equal => return Some(mid),
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
            }
        }
        None
    }

    /// Bisection lookup with the precondition made explicit: `NotSorted` if
    /// the sorted flag is clear, `NotFound` if no key compares equal.
    pub fn search_sorted<Q>(&self, key: &Q) -> Result<&V>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        if !self.sorted {
            return Err(ContainerError::NotSorted);
        }
        let index = self.bisect(key).ok_or(ContainerError::NotFound)?;
        Ok(&self.elements[index].value)
    }

    /// Value of some element whose key equals `key`, or `None` if there is
    /// none or the vector is not currently sorted.
    pub fn binary_search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        match self.search_sorted(key) {
            Ok(v) => Some(v),
            Err(ContainerError::NotSorted) => {
                log::trace!("binary search rejected: vector is not sorted");
                None
            }
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.elements.iter(),
        }
    }

    /// Visit at most `limit` elements (0 = all) front to back with their
    /// positions, in the current order.
    pub fn iterate<F>(&self, limit: usize, mut f: F) -> usize
    where
        F: FnMut(usize, &K, &V),
    {
        let mut visited = 0;
        for (i, e) in self.elements.iter().enumerate().take(crate::visit_limit(limit)) {
            f(i, &e.key, &e.value);
            visited += 1;
        }
        visited
    }

    /// Like [`iterate`](Self::iterate), back to front.
    pub fn iterate_reverse<F>(&self, limit: usize, mut f: F) -> usize
    where
        F: FnMut(usize, &K, &V),
    {
        let mut visited = 0;
        for (i, e) in self
            .elements
            .iter()
            .enumerate()
            .rev()
            .take(crate::visit_limit(limit))
        {
            f(i, &e.key, &e.value);
            visited += 1;
        }
        visited
    }

    /// Sort first if needed, then [`iterate`](Self::iterate).
    pub fn iterate_sorted<F>(&mut self, limit: usize, f: F) -> Result<usize>
    where
        C: KeyOrder<K>,
        F: FnMut(usize, &K, &V),
    {
        if !self.sorted {
            self.sort_stable()?;
        }
        Ok(self.iterate(limit, f))
    }

    /// Sort first if needed, then [`iterate_reverse`](Self::iterate_reverse).
    pub fn iterate_sorted_reverse<F>(&mut self, limit: usize, f: F) -> Result<usize>
    where
        C: KeyOrder<K>,
        F: FnMut(usize, &K, &V),
    {
        if !self.sorted {
            self.sort_stable()?;
        }
        Ok(self.iterate_reverse(limit, f))
    }
}

fn index_buffer(n: usize) -> Result<Vec<usize>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(n)
        .map_err(|_| ContainerError::allocation(n))?;
    Ok(buf)
}

/// Bottom-up merge sort of `perm` by the keys it points at. `aux` must have
/// the same length; on return `perm` holds the sorted order.
fn merge_sort_indices<K, V, C>(
    elements: &[Element<K, V>],
    order: &C,
    perm: &mut Vec<usize>,
    aux: &mut Vec<usize>,
) where
    C: KeyOrder<K>,
{
    let n = perm.len();
    let mut width = 1;
    while width < n {
        let mut lo = 0;
        while lo < n {
            let mid = lo.saturating_add(width).min(n);
            let hi = mid.saturating_add(width).min(n);
            merge_runs(elements, order, &perm[lo..hi], mid - lo, &mut aux[lo..hi]);
            lo = hi;
        }
        core::mem::swap(perm, aux);
        width *= 2;
    }
}

/// Merge `src[..split]` and `src[split..]` into `dst`, taking from the left
/// run whenever keys compare equal.
fn merge_runs<K, V, C>(
    elements: &[Element<K, V>],
    order: &C,
    src: &[usize],
    split: usize,
    dst: &mut [usize],
) where
    C: KeyOrder<K>,
{
    let (left, right) = src.split_at(split);
    let (mut i, mut j) = (0, 0);
    for out in dst.iter_mut() {
        let take_left = j == right.len()
            || (i < left.len()
                && order.compare(&elements[left[i]].key, &elements[right[j]].key)
                    != Ordering::Greater);
        if take_left {
            *out = left[i];
            i += 1;
        } else {
            *out = right[j];
            j += 1;
        }
    }
}

/// Reorder `items` so that `items[i]` becomes the old `items[perm[i]]`.
/// `perm` is consumed (left as the identity).
fn apply_permutation<T>(items: &mut [T], perm: &mut [usize]) {
    for start in 0..items.len() {
        if perm[start] == start {
            continue;
        }
        let mut pos = start;
        loop {
            let src = perm[pos];
            perm[pos] = pos;
            if src == start {
                break;
            }
            items.swap(pos, src);
            pos = src;
        }
    }
}

impl<K, V, C, R> Drop for SortedVec<K, V, C, R>
where
    R: Release<K, V>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, C, R> fmt::Debug for SortedVec<K, V, C, R>
where
    K: fmt::Debug,
    V: fmt::Debug,
    R: Release<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over `SortedVec` elements in their current order.
pub struct Iter<'a, K, V> {
    inner: core::slice::Iter<'a, Element<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|e| (&e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|e| (&e.key, &e.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<'a, K, V, C, R> IntoIterator for &'a SortedVec<K, V, C, R>
where
    R: Release<K, V>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
