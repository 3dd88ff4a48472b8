//! SortedList: doubly linked list kept in key order.
//!
//! Nodes live in a `SlotMap`; `prev`/`next`/`head`/`tail` are arena keys, so
//! splicing is O(1) without reference cycles. Lookups scan forward and stop
//! at the first key that compares greater than the target. Insertion checks
//! both ends first and otherwise walks from whichever end
//! [`KeyOrder::distance`] says is closer.

use crate::error::{ContainerError, Result};
use crate::keys::{KeyOrder, NaturalOrder};
use crate::reentrancy::BusyFlag;
use crate::release::{Dropping, Release};
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::iter::FusedIterator;
use slotmap::{DefaultKey, SlotMap};

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

/// Where a key belongs in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// An equal key is stored in this node.
    Replace(DefaultKey),
    /// A new node goes between these neighbours.
    Between {
        prev: Option<DefaultKey>,
        next: Option<DefaultKey>,
    },
}

struct Links<K, V> {
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

impl<K, V> Links<K, V> {
    fn locate<C: KeyOrder<K>>(&self, order: &C, key: &K) -> Placement {
        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            return Placement::Between {
                prev: None,
                next: None,
            };
        };
        let head_key = &self.nodes[head].key;
        let tail_key = &self.nodes[tail].key;
        let vs_head = order.compare(key, head_key);
        let vs_tail = order.compare(key, tail_key);

        if vs_head == Ordering::Equal {
            return Placement::Replace(head);
        }
        if vs_tail == Ordering::Equal {
            return Placement::Replace(tail);
        }
        if vs_tail == Ordering::Greater {
            return Placement::Between {
                prev: Some(tail),
                next: None,
            };
        }
        if vs_head == Ordering::Less {
            return Placement::Between {
                prev: None,
                next: Some(head),
            };
        }

        // head < key < tail: at least one node lies strictly between them.
        if order.distance(key, tail_key) < order.distance(key, head_key) {
            let mut cur = self.nodes[tail].prev;
            while let Some(slot) = cur {
                let node = &self.nodes[slot];
                match order.compare(key, &node.key) {
                    Ordering::Less => cur = node.prev,
                    Ordering::Equal => return Placement::Replace(slot),
                    Ordering::Greater => {
                        return Placement::Between {
                            prev: Some(slot),
                            next: node.next,
                        }
                    }
                }
            }
        } else {
            let mut cur = self.nodes[head].next;
            while let Some(slot) = cur {
                let node = &self.nodes[slot];
                match order.compare(key, &node.key) {
                    Ordering::Greater => cur = node.next,
                    Ordering::Equal => return Placement::Replace(slot),
                    Ordering::Less => {
                        return Placement::Between {
                            prev: node.prev,
                            next: Some(slot),
                        }
                    }
                }
            }
        }
        // Only reachable if the order is not total.
        Placement::Between {
            prev: self.tail,
            next: None,
        }
    }

    fn find<Q, C>(&self, order: &C, key: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let mut cur = self.head;
        while let Some(slot) = cur {
            let node = &self.nodes[slot];
            match order.compare(key, node.key.borrow()) {
                Ordering::Equal => return Some(slot),
                Ordering::Less => return None,
                Ordering::Greater => cur = node.next,
            }
        }
        None
    }

    fn link(&mut self, prev: Option<DefaultKey>, next: Option<DefaultKey>, key: K, value: V) {
        let slot = self.nodes.insert(Node {
            key,
            value,
            prev,
            next,
        });
        match prev {
            Some(p) => self.nodes[p].next = Some(slot),
            None => self.head = Some(slot),
        }
        match next {
            Some(n) => self.nodes[n].prev = Some(slot),
            None => self.tail = Some(slot),
        }
    }

    fn unlink(&mut self, slot: DefaultKey) -> Option<Node<K, V>> {
        let node = self.nodes.remove(slot)?;
        match node.prev {
            Some(p) => self.nodes[p].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.nodes[n].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node)
    }

    fn detach_all(&mut self) -> SlotMap<DefaultKey, Node<K, V>> {
        self.head = None;
        self.tail = None;
        core::mem::take(&mut self.nodes)
    }
}

/// Key/value list kept sorted by `C` with unique keys.
pub struct SortedList<K, V, C = NaturalOrder, R = Dropping>
where
    R: Release<K, V>,
{
    links: Links<K, V>,
    order: C,
    release: R,
    busy: BusyFlag,
}

impl<K: Ord, V> SortedList<K, V> {
    /// Empty list ordered by the key's `Ord`.
    ///
    /// `NaturalOrder` has no distance hint, so insertions always walk forward
    /// from the head. For integer keys, `SortedList::with_order(NumericOrder,
    /// Dropping)` lets an insertion start from whichever end is nearer.
    pub fn new() -> Self {
        Self::with_order(NaturalOrder, Dropping)
    }
}

impl<K: Ord, V> Default for SortedList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, R> SortedList<K, V, C, R>
where
    R: Release<K, V>,
{
    pub fn with_order(order: C, release: R) -> Self {
        Self {
            links: Links {
                nodes: SlotMap::new(),
                head: None,
                tail: None,
            },
            order,
            release,
            busy: BusyFlag::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.links.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.nodes.is_empty()
    }

    /// Insert in order, replacing an entry with an equal key.
    ///
    /// On replacement both the stored key and value are released and the
    /// incoming pair takes their node.
    pub fn insert(&mut self, key: K, value: V)
    where
        C: KeyOrder<K>,
    {
        let displaced = {
            let _g = self.busy.enter();
            match self.links.locate(&self.order, &key) {
                Placement::Replace(slot) => {
                    let node = &mut self.links.nodes[slot];
                    let old_key = core::mem::replace(&mut node.key, key);
                    let old_value = core::mem::replace(&mut node.value, value);
                    Some((old_key, old_value))
                }
                Placement::Between { prev, next } => {
                    self.links.link(prev, next, key, value);
                    None
                }
            }
        };
        if let Some((k, v)) = displaced {
            self.release.release_entry(k, v);
        }
    }

    fn find<Q>(&self, key: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let _g = self.busy.enter();
        self.links.find(&self.order, key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let slot = self.find(key)?;
        Some(&self.links.nodes[slot].value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let slot = self.find(key)?;
        Some(&mut self.links.nodes[slot].value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        self.find(key).is_some()
    }

    /// Unlink `key` and return the pair without releasing it.
    pub fn take<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let slot = self.find(key)?;
        self.links.unlink(slot).map(|n| (n.key, n.value))
    }

    /// Unlink `key` and release its key and value.
    pub fn remove<Q>(&mut self, key: &Q) -> Result<()>
    where
        K: Borrow<Q>,
        C: KeyOrder<Q>,
        Q: ?Sized,
    {
        let (k, v) = self.take(key).ok_or(ContainerError::NotFound)?;
        self.release.release_entry(k, v);
        Ok(())
    }

    /// Smallest entry.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.links
            .head
            .map(|h| &self.links.nodes[h])
            .map(|n| (&n.key, &n.value))
    }

    /// Largest entry.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.links
            .tail
            .map(|t| &self.links.nodes[t])
            .map(|n| (&n.key, &n.value))
    }

    pub fn clear(&mut self) {
        let detached = self.links.detach_all();
        for (_, node) in detached {
            self.release.release_entry(node.key, node.value);
        }
    }

    /// Entries in ascending key order; reversible.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.links.nodes,
            front: self.links.head,
            back: self.links.tail,
            remaining: self.links.nodes.len(),
        }
    }

    /// Visit at most `limit` entries (0 = all) in ascending order.
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

    /// Visit at most `limit` entries (0 = all) in descending order.
    pub fn foreach_reverse<F>(&self, limit: usize, mut f: F) -> usize
    where
        F: FnMut(&K, &V),
    {
        let mut visited = 0;
        for (k, v) in self.iter().rev().take(crate::visit_limit(limit)) {
            f(k, v);
            visited += 1;
        }
        visited
    }
}

impl<K, V, C, R> Drop for SortedList<K, V, C, R>
where
    R: Release<K, V>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, C, R> fmt::Debug for SortedList<K, V, C, R>
where
    K: fmt::Debug,
    V: fmt::Debug,
    R: Release<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Double-ended iterator over `SortedList` entries.
pub struct Iter<'a, K, V> {
    nodes: &'a SlotMap<DefaultKey, Node<K, V>>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.front?];
        self.front = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.back?];
        self.back = node.prev;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<'a, K, V, C, R> IntoIterator for &'a SortedList<K, V, C, R>
where
    R: Release<K, V>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
