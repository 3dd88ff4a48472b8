//! keyed-containers: a chained hash table, a sorted doubly linked list and a
//! sort-on-demand vector sharing one keyed-container contract.
//!
//! Internal Design:
//!
//! Summary
//! - Three independent containers, none depends on another:
//!   - ChainedHashTable<K, V, O, R>: separate chaining, doubling resize once
//!     the load factor would be exceeded, entries relinked (never moved) on
//!     resize.
//!   - SortedList<K, V, C, R>: doubly linked list in key order with early-exit
//!     lookups and nearest-end insertion walks.
//!   - SortedVec<K, V, C, R>: array in insertion order until an explicit
//!     stable merge sort; bisection only while the sorted flag is set.
//! - Policies are type parameters fixed at construction:
//!   - `O: KeyOps` hashes and compares keys for the table.
//!   - `C: KeyOrder` orders keys for the list and vector.
//!   - `R: Release` disposes of keys/values the container gives up.
//!
//! Ownership contract
//! - A key or value moved into a container leaves it exactly once: handed to
//!   `R` on overwrite, removal, clear or drop, or returned by `take`.
//! - Overwrite in the table keeps the stored key and releases the incoming
//!   one; overwrite in the list releases the stored key and keeps the
//!   incoming one.
//! - "Caller keeps ownership" is spelled with reference types: a container of
//!   `&'a K`/`&'a V` with the default `Dropping` policy never disposes of
//!   anything.
//! - A failed insert drops its arguments without calling `R`; the container
//!   never owned them.
//!
//! Storage
//! - Table entries and list nodes live in a `slotmap::SlotMap`; chain links,
//!   `prev`/`next` and head/tail are arena keys rather than pointers.
//! - The table stores each entry's hash, so resizing never calls `O`.
//! - Bucket arrays and vector storage are obtained with `try_reserve_exact`;
//!   failures surface as `ContainerError::AllocationFailure` and leave the
//!   container untouched.
//!
//! Reentrancy
//! - Single-threaded and `!Send`/`!Sync`. Each container carries a debug-only
//!   busy flag around the sections that call `O`/`C`; re-entering the same
//!   container from inside such a callback panics in debug builds.
//! - `R` always runs after the structure is consistent again, outside the
//!   guarded section.
//!
//! Logging
//! - Through the `log` facade: resizes and sorts at `debug`, vector growth
//!   and rejected unsorted searches at `trace`, allocation failures at
//!   `warn`. The crate installs no logger.

pub mod chained_hash_table;
#[cfg(test)]
mod chained_hash_table_proptest;
pub mod config;
pub mod error;
pub mod keys;
mod reentrancy;
pub mod release;
pub mod sorted_list;
pub mod sorted_vec;

// Public surface
pub use chained_hash_table::ChainedHashTable;
pub use config::{HashTableConfig, SortedVecConfig};
pub use error::{ContainerError, Result};
pub use keys::{FnKeyOps, KeyOps, KeyOrder, NaturalOrder, NumericOrder, StdKeyOps};
pub use release::{Dropping, PairRelease, Release, ReleaseFn};
pub use sorted_list::SortedList;
pub use sorted_vec::SortedVec;

/// Number of items a bounded visit may touch; a limit of 0 means no bound.
#[inline]
pub(crate) fn visit_limit(limit: usize) -> usize {
    if limit == 0 {
        usize::MAX
    } else {
        limit
    }
}
