use super::region::Claim;
use super::validate::{self, Anomaly, ValidationReport};
use super::zone::find_heap_for_caps;
use super::{halt, trace, Caps, Config, Fault, Heap, HeapInfo, Zone, Zones};
use crate::platform::Platform;
use crate::sync::{SpinLock, SpinLockGuard};
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

/// Recoverable allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// No heap of the zone provides the requested capabilities.
    #[error("no heap provides {0:?}")]
    NoMatchingHeap(Caps),
    /// Matching heaps have no room for the request.
    #[error("out of memory")]
    OutOfMemory,
    /// Zero bytes were requested.
    #[error("zero-sized allocation")]
    ZeroSize,
}

/// Totals over all heaps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    /// Bytes handed out.
    pub used: usize,
    /// Bytes left.
    pub free: usize,
    /// Bytes of allocator metadata. A power-management context save must
    /// reserve this much to preserve the heap state.
    pub metadata: usize,
}

struct Inner<'a> {
    zones: Zones<'a>,
    report: ValidationReport,
}

/// The heap allocator.
///
/// Every operation takes the heap spin lock with interrupts of the calling
/// core masked, and brackets metadata accesses with the coherency operations
/// of the platform. No operation blocks, and every one of them completes in
/// time bounded by the number of blocks of the searched heaps.
///
/// Precondition violations and corrupted state [`halt`] the system.
/// Exhaustion is reported as [`AllocError`].
pub struct Allocator<'a, P: Platform> {
    platform: P,
    config: Config,
    inner: SpinLock<Inner<'a>>,
}

impl<'a, P: Platform> Allocator<'a, P> {
    /// Boots the allocator.
    ///
    /// Tiles the block maps of every heap, fills free memory with the
    /// sentinel if [`Config::validate`] is set, and publishes the metadata.
    ///
    /// # Safety
    ///
    /// Every heap of `zones` must describe memory that is valid for reads and
    /// writes during `'a`, is used by nothing else, and doesn't overlap the
    /// allocator metadata.
    pub unsafe fn new(platform: P, config: Config, mut zones: Zones<'a>) -> Self {
        check_align(config.default_align);
        check_align(config.cache_line);
        if let Err(fault) = zones.tile() {
            halt(fault);
        }
        if config.validate {
            for (_, _, heap) in zones.iter().filter(|(zone, _, _)| *zone != Zone::Fixed) {
                let range = heap.mapped_range();
                unsafe { validate::fill(range.start, range.len()) };
            }
        }
        zones.iter().for_each(|(_, _, heap)| heap.publish(&platform));
        let inner = Inner { zones, report: ValidationReport::default() };
        Self { platform, config, inner: SpinLock::new(inner) }
    }

    /// Returns the platform.
    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocates `bytes` at the default alignment.
    pub fn allocate(
        &self,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        self.allocate_aligned(zone, caps, bytes, self.config.default_align)
    }

    /// Allocates `bytes` at the default alignment and zeroes them.
    pub fn allocate_zeroed(
        &self,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let mut inner = self.lock();
        self.allocate_locked(&mut inner, zone, caps, bytes, self.config.default_align, true)
    }

    /// Allocates `bytes` aligned to `align`.
    ///
    /// `align` must be a power of two. Anything else halts the system.
    ///
    /// # Examples
    ///
    /// ```
    /// use dsp_heap::config::Layout;
    /// use dsp_heap::heap::{Caps, Config, Zone};
    /// use dsp_heap::platform::Uniprocessor;
    ///
    /// let layout = Layout::parse(
    ///     r#"
    ///     [[heap.buffer]]
    ///     size = "1K"
    ///     caps = "RAM | DMA"
    ///     pools = [{ block = "256", capacity = 4 }]
    ///     "#,
    /// )
    /// .unwrap();
    /// let heap = dsp_heap::host::allocator(&layout, Uniprocessor, Config::new()).unwrap();
    /// let ptr = heap.allocate_aligned(Zone::Buffer, Caps::DMA, 300, 128).unwrap();
    /// assert_eq!(ptr.as_ptr() as usize % 128, 0);
    /// heap.free(ptr.as_ptr());
    /// ```
    pub fn allocate_aligned(
        &self,
        zone: Zone,
        caps: Caps,
        bytes: usize,
        align: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let mut inner = self.lock();
        self.allocate_locked(&mut inner, zone, caps, bytes, align, false)
    }

    /// Moves the allocation at `ptr` into a new allocation of `bytes`.
    ///
    /// The first `min(old, bytes)` bytes are copied, where `old` is the
    /// [`usable_size`](Allocator::usable_size) of `ptr`. A null `ptr` makes
    /// this a plain [`allocate`](Allocator::allocate). On failure the old
    /// allocation stays untouched.
    pub fn reallocate(
        &self,
        ptr: *mut u8,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if ptr.is_null() {
            return self.allocate(zone, caps, bytes);
        }
        let mut inner = self.lock();
        let old = self.cached(ptr as usize);
        let old_size = self.usable_size_locked(&inner.zones, old);
        let align = self.config.default_align;
        let new = self.allocate_locked(&mut inner, zone, caps, bytes, align, false)?;
        let new_addr = self.cached(new.as_ptr() as usize);
        let len = old_size.min(bytes);
        unsafe { ptr::copy_nonoverlapping(old as *const u8, new_addr as *mut u8, len) };
        self.free_locked(&mut inner, old);
        trace::reallocate(old, new_addr, bytes);
        Ok(new)
    }

    /// Releases the allocation at `ptr`. A null `ptr` is ignored.
    ///
    /// Freeing memory of a fixed heap, or a pointer outside every heap, halts
    /// the system. A repeated free is logged and otherwise ignored.
    pub fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let mut inner = self.lock();
        self.free_locked(&mut inner, ptr as usize);
    }

    /// Returns the number of bytes from `ptr` to the end of its run.
    pub fn usable_size(&self, ptr: *const u8) -> usize {
        let inner = self.lock();
        self.usable_size_locked(&inner.zones, self.cached(ptr as usize))
    }

    /// Frees every allocation of the startup heap of the calling core.
    ///
    /// Must be called from a secondary core.
    pub fn reset_core_startup_zone(&self) {
        self.reset_core_zone(Zone::Startup);
    }

    /// Rewinds the fixed heap of the calling core.
    ///
    /// Must be called from a secondary core.
    pub fn reset_core_fixed_zone(&self) {
        self.reset_core_zone(Zone::Fixed);
    }

    /// Returns the counters of heap `index` of `zone`. Per-core zones are
    /// indexed by core id.
    pub fn heap_info(&self, zone: Zone, index: usize) -> Option<HeapInfo> {
        let inner = self.lock();
        let heap = inner.zones.heap(zone, index)?;
        heap.refresh_record(&self.platform);
        Some(heap.info())
    }

    /// Returns totals over all heaps.
    pub fn usage(&self) -> Usage {
        let inner = self.lock();
        let usage = Usage { metadata: mem::size_of::<Self>(), ..Usage::default() };
        inner.zones.iter().fold(usage, |usage, (_, _, heap)| {
            heap.refresh_record(&self.platform);
            Usage {
                used: usage.used + heap.used(),
                free: usage.free + heap.free(),
                metadata: usage.metadata + heap.metadata_size(),
            }
        })
    }

    /// Logs the state of every heap.
    pub fn dump(&self) {
        self.inspect(trace::dump);
    }

    /// Returns the anomaly counters of the validation layer.
    pub fn validation_report(&self) -> ValidationReport {
        self.lock().report
    }

    /// Runs `f` on the heap registry under the heap lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&Zones<'a>) -> R) -> R {
        let inner = self.lock();
        inner.zones.iter().for_each(|(_, _, heap)| heap.refresh(&self.platform));
        f(&inner.zones)
    }

    fn lock(&self) -> SpinLockGuard<'_, Inner<'a>, P> {
        self.inner.lock(&self.platform)
    }

    fn cached(&self, addr: usize) -> usize {
        if self.platform.is_uncached(addr) { self.platform.cached(addr) } else { addr }
    }

    fn allocate_locked(
        &self,
        inner: &mut Inner<'a>,
        zone: Zone,
        caps: Caps,
        bytes: usize,
        align: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>, AllocError> {
        check_align(align);
        let result = self.claim_locked(inner, zone, caps, bytes, align, zeroed);
        match result {
            Ok(ptr) => trace::allocate(zone, caps, bytes, align, ptr.as_ptr() as usize),
            Err(err) => trace::allocate_failed(zone, caps, bytes, align, err),
        }
        result
    }

    fn claim_locked(
        &self,
        inner: &mut Inner<'a>,
        zone: Zone,
        caps: Caps,
        bytes: usize,
        align: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>, AllocError> {
        if bytes == 0 {
            return Err(AllocError::ZeroSize);
        }
        let core = self.platform.core_id();
        let mask = caps.heap_mask();
        let addr = match zone {
            Zone::Fixed => {
                let heap = self.core_heap(&mut inner.zones, zone, core, mask);
                let addr = heap
                    .bump(bytes, align.max(self.config.cache_line))
                    .unwrap_or_else(|| halt(Fault::FixedZoneExhausted { core, bytes }));
                heap.publish_record(&self.platform);
                addr
            }
            Zone::Startup => {
                let heap = self.core_heap(&mut inner.zones, zone, core, mask);
                let claim = self.claim(heap, bytes, align).ok_or(AllocError::OutOfMemory)?;
                self.check_claim(&mut inner.report, &claim);
                claim.run.ptr
            }
            Zone::Runtime | Zone::Buffer => {
                let claim = self.allocate_shared(&mut inner.zones, zone, mask, bytes, align)?;
                self.check_claim(&mut inner.report, &claim);
                claim.run.ptr
            }
        };
        if zeroed || self.config.zero_all {
            unsafe { ptr::write_bytes(addr as *mut u8, 0, bytes) };
        }
        let addr = if caps.contains(Caps::UNCACHED) { self.platform.uncached(addr) } else { addr };
        NonNull::new(addr as *mut u8).ok_or(AllocError::OutOfMemory)
    }

    fn core_heap<'z>(
        &self,
        zones: &'z mut Zones<'a>,
        zone: Zone,
        core: usize,
        caps: Caps,
    ) -> &'z mut Heap<'a> {
        let Some(heap) = zones.heap_mut(zone, core) else {
            halt(Fault::NoSuchCore { zone, core });
        };
        heap.refresh_record(&self.platform);
        if !heap.caps().satisfies(caps) {
            halt(Fault::CapsMismatch { zone, core, caps });
        }
        heap
    }

    fn allocate_shared(
        &self,
        zones: &mut Zones<'a>,
        zone: Zone,
        caps: Caps,
        bytes: usize,
        align: usize,
    ) -> Result<Claim, AllocError> {
        let table = zones.table_mut(zone);
        table.iter().for_each(|heap| heap.refresh_record(&self.platform));
        if find_heap_for_caps(table, caps).is_none() {
            if zone == Zone::Runtime {
                trace::fallback(caps);
                return self.allocate_shared(zones, Zone::Buffer, caps, bytes, align);
            }
            return Err(AllocError::NoMatchingHeap(caps));
        }
        table
            .iter_mut()
            .filter(|heap| heap.caps().satisfies(caps))
            .find_map(|heap| self.claim(heap, bytes, align))
            .ok_or(AllocError::OutOfMemory)
    }

    fn claim(&self, heap: &mut Heap<'a>, bytes: usize, align: usize) -> Option<Claim> {
        heap.refresh(&self.platform);
        let claim = heap.allocate(bytes, align)?;
        heap.map(claim.map).publish(&self.platform);
        heap.publish_record(&self.platform);
        Some(claim)
    }

    fn check_claim(&self, report: &mut ValidationReport, claim: &Claim) {
        if self.config.validate && !unsafe { validate::is_intact(claim.run.origin, claim.len()) } {
            let anomaly = Anomaly::WriteAfterFree { addr: claim.run.origin, len: claim.len() };
            report.record(anomaly);
            trace::anomaly(anomaly);
        }
    }

    fn free_locked(&self, inner: &mut Inner<'a>, ptr: usize) {
        let addr = self.cached(ptr);
        let core = self.platform.core_id();
        let loc =
            inner.zones.locate(addr, core, &self.platform).unwrap_or_else(|fault| halt(fault));
        let heap = &mut inner.zones.table_mut(loc.zone)[loc.heap];
        let map = heap.map(loc.map);
        let run = map.block_addr(loc.block);
        if !map.headers()[loc.block].is_used() {
            let block_size = map.block_size();
            self.double_free(&mut inner.report, addr, run, block_size);
            return;
        }
        let bytes = heap.release(loc.map, loc.block);
        heap.map(loc.map).publish(&self.platform);
        heap.publish_record(&self.platform);
        if self.config.validate {
            unsafe { validate::fill(run, bytes) };
        }
        trace::free(loc.zone, addr, bytes);
    }

    fn double_free(
        &self,
        report: &mut ValidationReport,
        ptr: usize,
        block: usize,
        block_size: usize,
    ) {
        if !self.config.validate {
            trace::double_free(ptr);
            return;
        }
        let anomaly = if unsafe { validate::is_intact(block, block_size) } {
            Anomaly::DoubleFree(ptr)
        } else {
            Anomaly::Corruption(ptr)
        };
        report.record(anomaly);
        trace::anomaly(anomaly);
    }

    fn usable_size_locked(&self, zones: &Zones<'a>, addr: usize) -> usize {
        let core = self.platform.core_id();
        let loc = zones.locate(addr, core, &self.platform).unwrap_or_else(|fault| halt(fault));
        let map = zones.table(loc.zone)[loc.heap].map(loc.map);
        let head = map.headers()[loc.block];
        if !head.is_used() || head.span() == 0 {
            halt(Fault::NotAllocated(addr));
        }
        map.block_addr(loc.block + head.span()) - addr
    }

    fn reset_core_zone(&self, zone: Zone) {
        let core = self.platform.core_id();
        if core == self.config.primary_core {
            halt(Fault::PrimaryCoreReset(zone));
        }
        let mut inner = self.lock();
        let Some(heap) = inner.zones.heap_mut(zone, core) else {
            halt(Fault::NoSuchCore { zone, core });
        };
        heap.refresh(&self.platform);
        heap.reset();
        if self.config.validate && zone != Zone::Fixed {
            let range = heap.mapped_range();
            unsafe { validate::fill(range.start, range.len()) };
        }
        heap.publish(&self.platform);
        trace::reset(zone, core);
    }
}

impl<P: Platform> fmt::Debug for Allocator<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish()
    }
}

fn check_align(align: usize) {
    if !align.is_power_of_two() {
        halt(Fault::BadAlignment(align));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{BlockHeader, BlockMap};
    use crate::platform::Uniprocessor;

    // Metadata-only heap at a fake address. Validation and zeroing stay off,
    // so the memory itself is never touched.
    fn scenario() -> Allocator<'static, Uniprocessor> {
        let small = Box::leak(Box::new([BlockHeader::FREE; 4]));
        let large = Box::leak(Box::new([BlockHeader::FREE; 2]));
        let maps = Box::leak(Box::new([BlockMap::new(16, small), BlockMap::new(64, large)]));
        let buffer = Box::leak(Box::new([Heap::new(0x1000, 0xC0, Caps::RAM, maps)]));
        let zones = Zones::new(Default::default(), Default::default(), Default::default(), buffer);
        unsafe { Allocator::new(Uniprocessor, Config::new(), zones) }
    }

    fn free_counts(heap: &Allocator<'_, Uniprocessor>) -> Vec<usize> {
        heap.inspect(|zones| {
            zones.table(Zone::Buffer)[0].maps().iter().map(BlockMap::free_count).collect()
        })
    }

    #[test]
    fn small_then_spanning() {
        let heap = scenario();
        let small = heap.allocate(Zone::Buffer, Caps::RAM, 10).unwrap().as_ptr() as usize;
        assert!((0x1000..0x1040).contains(&small));
        assert_eq!(small % 8, 0);
        assert_eq!(free_counts(&heap), [3, 2]);
        let large = heap.allocate(Zone::Buffer, Caps::RAM, 100).unwrap().as_ptr();
        assert_eq!(large as usize, 0x1040);
        assert_eq!(free_counts(&heap), [3, 0]);
        assert_eq!(heap.usable_size(large), 128);
        heap.free(large);
        assert_eq!(free_counts(&heap), [3, 2]);
        heap.inspect(|zones| {
            let map = &zones.table(Zone::Buffer)[0].maps()[1];
            assert!(map.headers().iter().all(|header| *header == BlockHeader::FREE));
        });
    }

    #[test]
    fn recoverable_failures() {
        let heap = scenario();
        assert_eq!(heap.allocate(Zone::Buffer, Caps::RAM, 0), Err(AllocError::ZeroSize));
        let no_dma = Err(AllocError::NoMatchingHeap(Caps::DMA));
        assert_eq!(heap.allocate(Zone::Buffer, Caps::DMA, 8), no_dma);
        assert_eq!(heap.allocate(Zone::Runtime, Caps::DMA, 8), no_dma);
        assert_eq!(heap.allocate(Zone::Buffer, Caps::RAM, 0x200), Err(AllocError::OutOfMemory));
    }

    #[test]
    fn runtime_falls_back_to_buffer() {
        let heap = scenario();
        let ptr = heap.allocate(Zone::Runtime, Caps::RAM, 16).unwrap();
        assert_eq!(ptr.as_ptr() as usize, 0x1000);
        assert_eq!(heap.heap_info(Zone::Buffer, 0), Some(HeapInfo { used: 16, free: 0xB0 }));
    }

    #[test]
    fn usage_totals() {
        let heap = scenario();
        heap.allocate(Zone::Buffer, Caps::RAM, 100).unwrap();
        let usage = heap.usage();
        assert_eq!((usage.used, usage.free), (128, 64));
        assert!(usage.metadata >= 6 * mem::size_of::<BlockHeader>());
    }

    #[test]
    #[should_panic(expected = "alignment 0 is not a power of two")]
    fn zero_alignment_halts() {
        let _ = scenario().allocate_aligned(Zone::Buffer, Caps::RAM, 8, 0);
    }

    #[test]
    #[should_panic(expected = "alignment 24 is not a power of two")]
    fn odd_alignment_halts() {
        let _ = scenario().allocate_aligned(Zone::Buffer, Caps::RAM, 8, 24);
    }

    #[test]
    #[should_panic(expected = "doesn't belong to any heap")]
    fn foreign_pointer_halts() {
        scenario().free(0x8000 as *mut u8);
    }

    #[test]
    #[should_panic(expected = "startup heap reset attempted from the primary core")]
    fn primary_reset_halts() {
        scenario().reset_core_startup_zone();
    }

    #[test]
    fn double_free_is_ignored() {
        let heap = scenario();
        let ptr = heap.allocate(Zone::Buffer, Caps::RAM, 100).unwrap().as_ptr();
        heap.free(ptr);
        heap.free(ptr);
        assert_eq!(free_counts(&heap), [4, 2]);
        assert!(heap.validation_report().is_clean());
        heap.free(ptr::null_mut());
    }
}
