use core::mem;

/// Run-time knobs of the allocator.
///
/// ```
/// use dsp_heap::heap::Config;
///
/// const CONFIG: Config = Config::new().cache_line(128).validate(true);
/// assert_eq!(CONFIG.cache_line, 128);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Core that boots the system. It owns the per-core zones for good and
    /// can't reset them.
    pub primary_core: usize,
    /// Alignment of [`allocate`](super::Allocator::allocate) and friends.
    pub default_align: usize,
    /// Data cache line size. Fixed-zone allocations are aligned to it.
    pub cache_line: usize,
    /// Fill free memory with a sentinel and check it on allocation and on
    /// double free.
    pub validate: bool,
    /// Zero every allocation, not only those from
    /// [`allocate_zeroed`](super::Allocator::allocate_zeroed).
    pub zero_all: bool,
}

impl Config {
    /// Creates the default configuration.
    pub const fn new() -> Self {
        Self {
            primary_core: 0,
            default_align: mem::size_of::<usize>(),
            cache_line: 64,
            validate: false,
            zero_all: false,
        }
    }

    /// Sets [`primary_core`](Config::primary_core).
    #[must_use]
    pub const fn primary_core(mut self, core: usize) -> Self {
        self.primary_core = core;
        self
    }

    /// Sets [`default_align`](Config::default_align).
    #[must_use]
    pub const fn default_align(mut self, align: usize) -> Self {
        self.default_align = align;
        self
    }

    /// Sets [`cache_line`](Config::cache_line).
    #[must_use]
    pub const fn cache_line(mut self, size: usize) -> Self {
        self.cache_line = size;
        self
    }

    /// Sets [`validate`](Config::validate).
    #[must_use]
    pub const fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    /// Sets [`zero_all`](Config::zero_all).
    #[must_use]
    pub const fn zero_all(mut self, enabled: bool) -> Self {
        self.zero_all = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
