use super::{Caps, Zone};

/// Unrecoverable heap conditions.
///
/// A fault means a programming or build defect, or corrupted allocator
/// state. Continuing would make things worse, so every fault ends up in
/// [`halt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Fault {
    /// Requested alignment is zero or not a power of two.
    #[error("alignment {0} is not a power of two")]
    BadAlignment(usize),
    /// A per-core zone can't provide the requested capabilities.
    #[error("{zone} heap of core {core} doesn't provide {caps:?}")]
    CapsMismatch {
        /// Zone of the heap.
        zone: Zone,
        /// Core owning the heap.
        core: usize,
        /// Requested capabilities.
        caps: Caps,
    },
    /// The fixed heap of a core is exhausted.
    #[error("fixed heap of core {core} exhausted by a request for {bytes} bytes")]
    FixedZoneExhausted {
        /// Core owning the heap.
        core: usize,
        /// Requested size.
        bytes: usize,
    },
    /// Attempt to free a pointer into a fixed heap.
    #[error("{0:#x} belongs to a fixed heap and can't be freed")]
    FixedZoneFree(usize),
    /// No heap contains the pointer.
    #[error("{0:#x} doesn't belong to any heap")]
    UnknownPointer(usize),
    /// The resolved run doesn't start on a block boundary.
    #[error("{0:#x} resolves to a run that is not block aligned")]
    MisalignedBlock(usize),
    /// The pointer doesn't refer to a live allocation.
    #[error("{0:#x} is not allocated")]
    NotAllocated(usize),
    /// The heap lock was taken twice by the same core.
    #[error("heap lock re-entered on core {0}")]
    LockReentered(usize),
    /// Per-core zones can be reset only by a secondary core.
    #[error("{0} heap reset attempted from the primary core")]
    PrimaryCoreReset(Zone),
    /// The calling core has no heap in a per-core zone.
    #[error("core {core} has no {zone} heap")]
    NoSuchCore {
        /// Zone of the heap.
        zone: Zone,
        /// Calling core.
        core: usize,
    },
    /// A heap declares blocks of zero bytes.
    #[error("heap at {base:#x} declares a zero block size")]
    ZeroBlockSize {
        /// Heap base address.
        base: usize,
    },
    /// Block maps don't fit into their heap.
    #[error("block maps of heap at {base:#x} need {required} bytes, but the heap has {size}")]
    LayoutOverflow {
        /// Heap base address.
        base: usize,
        /// Heap size.
        size: usize,
        /// Space the block maps occupy.
        required: usize,
    },
}

/// Halts the system because of `fault`.
///
/// Logs the fault at error level, then panics. Firmware is built with
/// `panic = "abort"`, so the panic handler of the platform takes over from
/// here.
#[cold]
#[track_caller]
pub fn halt(fault: Fault) -> ! {
    log::error!(target: "heap", "{fault}");
    panic!("heap fault: {fault}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(Fault::BadAlignment(3).to_string(), "alignment 3 is not a power of two");
        assert_eq!(
            Fault::CapsMismatch { zone: Zone::Fixed, core: 1, caps: Caps::DMA }.to_string(),
            "fixed heap of core 1 doesn't provide Caps(DMA)"
        );
        assert_eq!(Fault::UnknownPointer(0x40).to_string(), "0x40 doesn't belong to any heap");
    }

    #[test]
    #[should_panic(expected = "heap fault: 0x1000 belongs to a fixed heap and can't be freed")]
    fn halt_panics() {
        halt(Fault::FixedZoneFree(0x1000));
    }
}
