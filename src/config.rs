//! Construction parameters for the array-backed containers.
//!
//! Both configurations are plain data with builder-style setters. They are
//! checked by `validate()` when a container is built from them, so an invalid
//! value is reported as [`ContainerError::InvalidArgument`] and no container
//! is produced.

use crate::error::{ContainerError, Result};

/// Bucket count used when a hash table is created with capacity 0.
pub const DEFAULT_TABLE_CAPACITY: usize = 1024;

/// Load factor above which a hash table doubles its bucket array.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.75;

/// Element capacity of a vector built from `SortedVecConfig::default()`.
pub const DEFAULT_VEC_CAPACITY: usize = 16;

/// Multiplier applied to a full vector's capacity.
pub const DEFAULT_VEC_GROWTH_FACTOR: usize = 2;

/// Configuration for [`ChainedHashTable`](crate::ChainedHashTable).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashTableConfig {
    /// Initial bucket count; 0 selects [`DEFAULT_TABLE_CAPACITY`].
    pub initial_capacity: usize,
    /// Maximum `len / capacity` ratio kept after every insert.
    pub max_load_factor: f64,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_TABLE_CAPACITY,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
        }
    }
}

impl HashTableConfig {
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn max_load_factor(mut self, factor: f64) -> Self {
        self.max_load_factor = factor;
        self
    }

    /// Bucket count the table actually starts with.
    pub fn effective_capacity(&self) -> usize {
        if self.initial_capacity == 0 {
            DEFAULT_TABLE_CAPACITY
        } else {
            self.initial_capacity
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_load_factor.is_finite() || self.max_load_factor <= 0.0 {
            return Err(ContainerError::InvalidArgument(
                "max load factor must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Configuration for [`SortedVec`](crate::SortedVec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortedVecConfig {
    /// Element slots reserved up front; must be non-zero.
    pub initial_capacity: usize,
    /// Capacity multiplier used when the vector is full; at least 2.
    pub growth_factor: usize,
}

impl Default for SortedVecConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_VEC_CAPACITY,
            growth_factor: DEFAULT_VEC_GROWTH_FACTOR,
        }
    }
}

impl SortedVecConfig {
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn growth_factor(mut self, factor: usize) -> Self {
        self.growth_factor = factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity == 0 {
            return Err(ContainerError::InvalidArgument(
                "initial capacity must be non-zero",
            ));
        }
        if self.growth_factor < 2 {
            return Err(ContainerError::InvalidArgument(
                "growth factor must be at least 2",
            ));
        }
        Ok(())
    }
}
