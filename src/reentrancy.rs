//! Debug-only detection of re-entry from policy callbacks.
//!
//! Containers call into user code (hash, equality, comparison) while an
//! operation is in progress. A callback that reaches back into the same
//! container through some side channel would observe it mid-operation. In
//! debug builds every guarded entry point marks the container busy and a
//! nested entry panics; in release builds the flag is compiled out.
//!
//! Release callbacks are invoked after the guard is dropped, so `Release`
//! implementations and `Drop` of keys/values may use the container freely.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Per-container busy flag. Guard entry points with
/// `let _g = self.busy.enter();`.
#[derive(Debug)]
pub(crate) struct BusyFlag {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Containers are single-threaded; keep them !Send + !Sync.
    _nosend: PhantomData<*mut ()>,
}

impl BusyFlag {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _nosend: PhantomData,
        }
    }

    /// Mark the container busy until the returned guard is dropped.
    #[inline]
    pub(crate) fn enter(&self) -> BusyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "container re-entered from a key policy callback"
            );
            BusyGuard { flag: self }
        }

        #[cfg(not(debug_assertions))]
        {
            BusyGuard { _z: PhantomData }
        }
    }
}

impl Default for BusyFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct BusyGuard<'a> {
    #[cfg(debug_assertions)]
    flag: &'a BusyFlag,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.flag.busy.set(false);
    }
}
