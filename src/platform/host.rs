use super::{Coherency, Platform, Region};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

std::thread_local! {
    static CORE: Cell<usize> = const { Cell::new(0) };
    static MASKED: Cell<bool> = const { Cell::new(false) };
}

/// Platform simulated with host threads.
///
/// Each host thread plays one DSP core, selected with
/// [`enter_core`](HostPlatform::enter_core). Cache maintenance is counted but
/// otherwise a no-op, because host caches are coherent. Uncached aliases are
/// formed by setting [`UNCACHED_BIT`](HostPlatform::UNCACHED_BIT).
#[derive(Debug, Default)]
pub struct HostPlatform {
    publishes: AtomicUsize,
    refreshes: AtomicUsize,
}

impl HostPlatform {
    /// Address bit marking an uncached alias.
    pub const UNCACHED_BIT: usize = 1 << (usize::BITS - 2);

    /// Creates a new host platform.
    pub const fn new() -> Self {
        Self { publishes: AtomicUsize::new(0), refreshes: AtomicUsize::new(0) }
    }

    /// Makes the current thread act as core number `core`.
    pub fn enter_core(core: usize) {
        CORE.with(|cell| cell.set(core));
    }

    /// Returns `true` if the current thread is inside a critical section.
    pub fn interrupts_masked() -> bool {
        MASKED.with(Cell::get)
    }

    /// Returns the number of publish operations issued so far.
    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::Relaxed)
    }

    /// Returns the number of refresh operations issued so far.
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl Coherency for HostPlatform {
    fn publish(&self, _region: Region) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    fn refresh(&self, _region: Region) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

impl Platform for HostPlatform {
    fn core_id(&self) -> usize {
        CORE.with(Cell::get)
    }

    fn save_and_disable_interrupts(&self) -> usize {
        usize::from(MASKED.with(|masked| masked.replace(true)))
    }

    fn restore_interrupts(&self, state: usize) {
        MASKED.with(|masked| masked.set(state != 0));
    }

    fn uncached(&self, addr: usize) -> usize {
        addr | Self::UNCACHED_BIT
    }

    fn cached(&self, addr: usize) -> usize {
        addr & !Self::UNCACHED_BIT
    }

    fn is_uncached(&self, addr: usize) -> bool {
        addr & Self::UNCACHED_BIT != 0
    }
}
