//! Software cache coherency.
//!
//! DSP cores don't snoop each other's data caches. Heap metadata written by
//! one core stays in its private cache until written back, and another core
//! may keep reading a stale line until it invalidates it. The heap brackets
//! every access to shared metadata with the two operations of [`Coherency`]:
//!
//! * [`publish`](Coherency::publish) after a mutation, so that the next core
//!   refreshing the region sees the new contents;
//! * [`refresh`](Coherency::refresh) before a read that may be stale.
//!
//! This defines visibility only. Exclusion is provided by the heap lock.

use core::mem;

/// A contiguous range of memory holding shared metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    /// Start address.
    pub addr: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Region {
    /// Creates a new region.
    #[inline]
    pub const fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }

    /// Returns the region occupied by `value`.
    #[inline]
    pub fn of<T>(value: &T) -> Self {
        Self::new(value as *const T as usize, mem::size_of::<T>())
    }

    /// Returns the region occupied by the elements of `slice`.
    #[inline]
    pub fn of_slice<T>(slice: &[T]) -> Self {
        Self::new(slice.as_ptr() as usize, mem::size_of_val(slice))
    }
}

/// Cache maintenance operations supplied by the platform.
///
/// Implementations must not assume a particular cache line size for the
/// passed regions: a region can start and end anywhere, and an implementation
/// widens it to whole lines itself.
pub trait Coherency {
    /// Writes back the current core's cached copy of `region` to shared
    /// memory.
    fn publish(&self, region: Region);

    /// Discards the current core's cached copy of `region`, so that the next
    /// read comes from shared memory.
    fn refresh(&self, region: Region);
}
