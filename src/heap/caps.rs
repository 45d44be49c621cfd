bitflags::bitflags! {
    /// Memory capabilities.
    ///
    /// Every heap advertises the capabilities of its memory, and every request
    /// states the capabilities it needs. A heap serves a request when its
    /// capabilities are a superset of the requested ones.
    ///
    /// In a layout description the flags are written by name, separated by
    /// `|`, for example `"RAM | DMA"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "host", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct Caps: u32 {
        /// General purpose RAM.
        const RAM = 1 << 0;
        /// Read-only memory.
        const ROM = 1 << 1;
        /// External memory.
        const EXT = 1 << 2;
        /// Low power memory.
        const LP = 1 << 3;
        /// High performance memory.
        const HP = 1 << 4;
        /// Memory reachable by DMA engines.
        const DMA = 1 << 5;
        /// Memory accessed through the data cache.
        const CACHE = 1 << 6;
        /// Executable memory.
        const EXEC = 1 << 7;
        /// Request-only flag: return the uncached alias of the allocation.
        ///
        /// It takes no part in heap matching.
        const UNCACHED = 1 << 31;
    }
}

impl Caps {
    /// Returns the part of the request matched against heap capabilities.
    #[inline]
    pub const fn heap_mask(self) -> Self {
        self.difference(Self::UNCACHED)
    }

    /// Returns `true` if a heap with capabilities `self` can serve a request
    /// for `request`.
    #[inline]
    pub const fn satisfies(self, request: Self) -> bool {
        self.contains(request.heap_mask())
    }
}
