use super::map::{BlockMap, Run};
use super::{align_up, Caps, Fault};
use crate::platform::{Coherency, Region};
use core::mem;
use core::ops::Range;

/// One physical memory region.
///
/// A block-mapped heap is split into [`BlockMap`]s tiled in declaration
/// order. A heap without block maps is a fixed heap, allocated by bumping
/// the used counter.
#[derive(Debug)]
pub struct Heap<'a> {
    base: usize,
    size: usize,
    caps: Caps,
    used: usize,
    maps: &'a mut [BlockMap<'a>],
}

/// A snapshot of the heap counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapInfo {
    /// Bytes handed out.
    pub used: usize,
    /// Bytes left.
    pub free: usize,
}

/// Result of a block-mapped allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Claim {
    /// Index of the block map.
    pub map: usize,
    /// Block size of the map.
    pub block_size: usize,
    /// Claimed blocks.
    pub run: Run,
}

impl Claim {
    /// Returns the number of bytes in the claimed blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.run.count * self.block_size
    }

    /// Returns `true` if no blocks were claimed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.run.count == 0
    }
}

impl<'a> Heap<'a> {
    /// Creates a block-mapped heap of `size` bytes at `base`.
    ///
    /// `maps` should be sorted by ascending block size. Their addresses are
    /// assigned when the allocator boots.
    pub fn new(base: usize, size: usize, caps: Caps, maps: &'a mut [BlockMap<'a>]) -> Self {
        Self { base, size, caps, used: 0, maps }
    }

    /// Creates a fixed heap of `size` bytes at `base`.
    pub fn fixed(base: usize, size: usize, caps: Caps) -> Self {
        Self::new(base, size, caps, Default::default())
    }

    /// Returns the start address.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Returns the size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the capabilities of the memory.
    #[inline]
    pub fn caps(&self) -> Caps {
        self.caps
    }

    /// Returns the number of bytes handed out.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns the number of bytes left.
    #[inline]
    pub fn free(&self) -> usize {
        self.size - self.used
    }

    /// Returns the counters.
    #[inline]
    pub fn info(&self) -> HeapInfo {
        HeapInfo { used: self.used, free: self.free() }
    }

    /// Returns the block maps.
    #[inline]
    pub fn maps(&self) -> &[BlockMap<'a>] {
        self.maps
    }

    /// Returns `true` for a heap without block maps.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.maps.is_empty()
    }

    /// Returns `true` if `addr` lies inside the heap.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// Returns the address range covered by the block maps.
    pub fn mapped_range(&self) -> Range<usize> {
        let len = self.maps.iter().map(BlockMap::size).sum::<usize>();
        self.base..self.base + len
    }

    /// Returns the number of bytes of allocator metadata describing the
    /// heap.
    pub fn metadata_size(&self) -> usize {
        mem::size_of::<Self>()
            + mem::size_of_val(self.maps)
            + self.maps.iter().map(|map| mem::size_of_val(map.headers())).sum::<usize>()
    }

    /// Assigns block map addresses, one after another from the heap base.
    pub fn tile(&mut self) -> Result<(), Fault> {
        let (base, size) = (self.base, self.size);
        let mut required = 0_usize;
        for map in self.maps.iter_mut() {
            if map.block_size() == 0 {
                return Err(Fault::ZeroBlockSize { base });
            }
            map.place(base + required);
            required = map
                .block_size()
                .checked_mul(map.count())
                .and_then(|len| required.checked_add(len))
                .ok_or(Fault::LayoutOverflow { base, size, required: usize::MAX })?;
        }
        if required > size {
            return Err(Fault::LayoutOverflow { base, size, required });
        }
        Ok(())
    }

    /// Bumps the used counter of a fixed heap by `bytes` at `align`.
    pub fn bump(&mut self, bytes: usize, align: usize) -> Option<usize> {
        let addr = align_up(self.base + self.used, align)?;
        let end = addr.checked_add(bytes)?;
        if end - self.base > self.size {
            return None;
        }
        self.used = end - self.base;
        Some(addr)
    }

    /// Allocates `bytes` at `align` from the block maps.
    ///
    /// A single block is tried in every map by ascending block size first.
    /// Then a run of blocks is searched by descending block size, provided
    /// the heap has enough free space at all.
    pub fn allocate(&mut self, bytes: usize, align: usize) -> Option<Claim> {
        let single = self
            .maps
            .iter()
            .enumerate()
            .find_map(|(index, map)| map.find_block(bytes, align).map(|run| (index, run)));
        let (index, run) = match single {
            Some(found) => found,
            None if self.free() >= bytes => self
                .maps
                .iter()
                .enumerate()
                .rev()
                .find_map(|(index, map)| map.find_run(bytes, align).map(|run| (index, run)))?,
            None => return None,
        };
        let map = &mut self.maps[index];
        map.claim(&run);
        let claim = Claim { map: index, block_size: map.block_size(), run };
        self.used += claim.len();
        Some(claim)
    }

    /// Returns the index of the block map containing `addr`.
    pub fn locate(&self, addr: usize) -> Option<usize> {
        self.maps.iter().position(|map| map.contains(addr))
    }

    /// Releases the run headed by block `start` of map `map`. Returns the
    /// number of bytes released.
    pub fn release(&mut self, map: usize, start: usize) -> usize {
        let map = &mut self.maps[map];
        let bytes = map.release(start) * map.block_size();
        self.used -= bytes;
        bytes
    }

    /// Marks the whole heap free.
    pub fn reset(&mut self) {
        self.used = 0;
        self.maps.iter_mut().for_each(BlockMap::reset);
    }

    /// Checks the counters against the block maps.
    pub fn is_consistent(&self) -> bool {
        self.used <= self.size
            && (self.is_fixed()
                || self.maps.iter().all(BlockMap::is_consistent)
                    && self.used == self.maps.iter().map(BlockMap::used_bytes).sum::<usize>())
    }

    pub(crate) fn map(&self, index: usize) -> &BlockMap<'a> {
        &self.maps[index]
    }

    /// Writes back the heap record.
    pub fn publish_record(&self, coherency: &(impl Coherency + ?Sized)) {
        coherency.publish(Region::of(self));
    }

    /// Invalidates the heap record.
    pub fn refresh_record(&self, coherency: &(impl Coherency + ?Sized)) {
        coherency.refresh(Region::of(self));
    }

    /// Writes back the heap record, the block maps and their headers.
    pub fn publish(&self, coherency: &(impl Coherency + ?Sized)) {
        self.publish_record(coherency);
        self.maps.iter().for_each(|map| map.publish(coherency));
    }

    /// Invalidates the heap record, the block maps and their headers.
    pub fn refresh(&self, coherency: &(impl Coherency + ?Sized)) {
        self.refresh_record(coherency);
        self.maps.iter().for_each(|map| map.refresh(coherency));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::map::BlockHeader;

    fn heap(base: usize, size: usize, maps: &[(usize, usize)]) -> Heap<'static> {
        let maps = maps
            .iter()
            .map(|&(block_size, count)| {
                let headers = Box::leak(vec![BlockHeader::FREE; count].into_boxed_slice());
                BlockMap::new(block_size, headers)
            })
            .collect::<Vec<_>>();
        let mut heap = Heap::new(base, size, Caps::RAM, Box::leak(maps.into_boxed_slice()));
        heap.tile().unwrap();
        heap
    }

    #[test]
    fn tiling() {
        let heap = heap(0x1000, 0xC0, &[(16, 4), (64, 2)]);
        assert_eq!(heap.maps()[0].base(), 0x1000);
        assert_eq!(heap.maps()[1].base(), 0x1040);
        assert_eq!(heap.maps()[1].end(), 0x10C0);
        assert_eq!(heap.mapped_range(), 0x1000..0x10C0);
    }

    #[test]
    fn tiling_overflow() {
        let headers = Box::leak(vec![BlockHeader::FREE; 4].into_boxed_slice());
        let maps = Box::leak(Box::new([BlockMap::new(64, headers)]));
        let mut heap = Heap::new(0x1000, 0x80, Caps::RAM, maps);
        let overflow = Fault::LayoutOverflow { base: 0x1000, size: 0x80, required: 0x100 };
        assert_eq!(heap.tile(), Err(overflow));
        let headers = Box::leak(vec![BlockHeader::FREE; 4].into_boxed_slice());
        let maps = Box::leak(Box::new([BlockMap::new(0, headers)]));
        let mut heap = Heap::new(0x1000, 0x80, Caps::RAM, maps);
        assert_eq!(heap.tile(), Err(Fault::ZeroBlockSize { base: 0x1000 }));
    }

    #[test]
    fn single_then_multi() {
        let mut heap = heap(0x1000, 0xC0, &[(16, 4), (64, 2)]);
        let claim = heap.allocate(10, 8).unwrap();
        assert_eq!((claim.map, claim.run.ptr, claim.len()), (0, 0x1000, 16));
        let claim = heap.allocate(100, 8).unwrap();
        assert_eq!((claim.map, claim.run.ptr, claim.run.count), (1, 0x1040, 2));
        assert_eq!(heap.info(), HeapInfo { used: 144, free: 48 });
        assert!(heap.allocate(100, 8).is_none());
        assert!(heap.is_consistent());
        assert_eq!(heap.locate(0x1080), Some(1));
        assert_eq!(heap.release(1, 0), 128);
        assert_eq!(heap.used(), 16);
        assert!(heap.is_consistent());
    }

    #[test]
    fn multi_block_needs_free_space() {
        let mut heap = heap(0x1000, 0x40, &[(16, 4)]);
        assert!(heap.allocate(65, 4).is_none());
        let claim = heap.allocate(64, 4).unwrap();
        assert_eq!(claim.run.count, 4);
        assert_eq!(heap.free(), 0);
    }

    #[test]
    fn bump() {
        let mut heap = Heap::fixed(0x2000, 0x100, Caps::RAM);
        assert_eq!(heap.bump(10, 64), Some(0x2000));
        assert_eq!(heap.bump(10, 64), Some(0x2040));
        assert_eq!(heap.used(), 0x4A);
        assert_eq!(heap.bump(0xC0, 64), None);
        assert_eq!(heap.bump(0x80, 64), Some(0x2080));
        assert_eq!(heap.free(), 0);
        heap.reset();
        assert_eq!(heap.used(), 0);
    }
}
