//! Platform services.
//!
//! The heap doesn't touch hardware directly. Core identification, interrupt
//! masking, cache maintenance, and address aliasing are provided by the
//! platform crate through the [`Platform`] trait, and injected into the
//! [`Allocator`](crate::heap::Allocator) at boot.

mod coherency;
#[cfg(feature = "host")]
mod host;
mod interrupts;

#[cfg(feature = "host")]
pub use self::host::HostPlatform;
pub use self::{
    coherency::{Coherency, Region},
    interrupts::Interrupts,
};

/// Hardware services of a multi-core DSP.
pub trait Platform: Coherency {
    /// Returns the index of the core executing the call.
    fn core_id(&self) -> usize;

    /// Disables interrupts on the current core and returns the previous
    /// interrupt state.
    fn save_and_disable_interrupts(&self) -> usize;

    /// Restores the interrupt state returned by
    /// [`save_and_disable_interrupts`](Platform::save_and_disable_interrupts).
    fn restore_interrupts(&self, state: usize);

    /// Translates a cached address to its alias that bypasses the data cache.
    #[inline]
    fn uncached(&self, addr: usize) -> usize {
        addr
    }

    /// Translates an uncached alias back to the cached address.
    #[inline]
    fn cached(&self, addr: usize) -> usize {
        addr
    }

    /// Returns `true` if `addr` is an uncached alias.
    #[inline]
    fn is_uncached(&self, addr: usize) -> bool {
        let _ = addr;
        false
    }
}

/// A single-core platform with coherent memory and no interrupts to mask.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uniprocessor;

impl Coherency for Uniprocessor {
    #[inline]
    fn publish(&self, _region: Region) {}

    #[inline]
    fn refresh(&self, _region: Region) {}
}

impl Platform for Uniprocessor {
    #[inline]
    fn core_id(&self) -> usize {
        0
    }

    #[inline]
    fn save_and_disable_interrupts(&self) -> usize {
        0
    }

    #[inline]
    fn restore_interrupts(&self, _state: usize) {}
}
