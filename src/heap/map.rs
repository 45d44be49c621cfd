use super::{align_up, Fault};
use crate::platform::{Coherency, Region};

/// Per-block metadata.
///
/// A live allocation occupies a run of one or more consecutive blocks. Every
/// header of the run is marked used and records the run's origin, the address
/// of its first block. Only the head of the run records the run length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct BlockHeader {
    origin: usize,
    span: usize,
    used: bool,
}

impl BlockHeader {
    /// A header of a free block.
    pub const FREE: Self = Self { origin: 0, span: 0, used: false };

    /// Returns `true` if the block belongs to a live run.
    #[inline]
    pub const fn is_used(&self) -> bool {
        self.used
    }

    /// Returns the run length in blocks. Zero for free blocks and for the
    /// tail blocks of a run.
    #[inline]
    pub const fn span(&self) -> usize {
        self.span
    }

    /// Returns the address of the first block of the run, or `None` for a
    /// free block.
    #[inline]
    pub const fn origin(&self) -> Option<usize> {
        if self.origin == 0 { None } else { Some(self.origin) }
    }
}

/// A run of blocks chosen for an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    /// Index of the first block.
    pub start: usize,
    /// Number of blocks.
    pub count: usize,
    /// Address of the first block.
    pub origin: usize,
    /// Aligned address handed out to the caller.
    pub ptr: usize,
}

/// One size class of a heap.
///
/// The map owns `headers.len()` blocks of `block_size` bytes each, laid out
/// contiguously from `base`. The base is assigned when the heap is tiled at
/// boot.
///
/// `first_free` is a hint: whenever the map has free blocks, it is at or
/// before the lowest free block. Searches start from it but never trust it
/// to be free.
#[derive(Debug, Default)]
pub struct BlockMap<'a> {
    base: usize,
    block_size: usize,
    first_free: usize,
    free_count: usize,
    headers: &'a mut [BlockHeader],
}

impl<'a> BlockMap<'a> {
    /// Creates a map of `headers.len()` blocks of `block_size` bytes. All
    /// blocks start free.
    pub fn new(block_size: usize, headers: &'a mut [BlockHeader]) -> Self {
        headers.fill(BlockHeader::FREE);
        Self { base: 0, block_size, first_free: 0, free_count: headers.len(), headers }
    }

    pub(crate) fn place(&mut self, base: usize) {
        self.base = base;
    }

    /// Returns the address of the first block.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Returns the address past the last block.
    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.size()
    }

    /// Returns the block size.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of blocks.
    #[inline]
    pub fn count(&self) -> usize {
        self.headers.len()
    }

    /// Returns the number of free blocks.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Returns the first-free hint.
    #[inline]
    pub fn first_free(&self) -> usize {
        self.first_free
    }

    /// Returns the number of bytes the map spans.
    #[inline]
    pub fn size(&self) -> usize {
        self.block_size * self.count()
    }

    /// Returns the number of bytes in used blocks.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.block_size * (self.count() - self.free_count)
    }

    /// Returns the header table.
    #[inline]
    pub fn headers(&self) -> &[BlockHeader] {
        self.headers
    }

    /// Returns the address of block `index`.
    #[inline]
    pub fn block_addr(&self, index: usize) -> usize {
        self.base + index * self.block_size
    }

    /// Returns `true` if `addr` lies inside the map.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        (self.base..self.end()).contains(&addr)
    }

    /// Finds a single free block able to hold `bytes` at `align`.
    pub fn find_block(&self, bytes: usize, align: usize) -> Option<Run> {
        if self.free_count == 0 || self.block_size < bytes {
            return None;
        }
        (self.first_free..self.count()).find_map(|index| {
            if self.headers[index].used {
                return None;
            }
            let origin = self.block_addr(index);
            let ptr = align_up(origin, align)?;
            let fits = ptr - origin + bytes <= self.block_size;
            fits.then_some(Run { start: index, count: 1, origin, ptr })
        })
    }

    /// Finds the first run of free blocks able to hold `bytes` at `align`.
    ///
    /// The aligned address must fall into the first block of the run.
    pub fn find_run(&self, bytes: usize, align: usize) -> Option<Run> {
        if self.free_count == 0 {
            return None;
        }
        let mut index = self.first_free;
        while index < self.count() {
            if self.headers[index].used {
                index += 1;
                continue;
            }
            let origin = self.block_addr(index);
            let ptr = align_up(origin, align)?;
            let padding = ptr - origin;
            if padding >= self.block_size {
                index += 1;
                continue;
            }
            let count = (padding + bytes).div_ceil(self.block_size);
            if index + count > self.count() {
                return None;
            }
            match self.headers[index..index + count].iter().position(|header| header.used) {
                Some(used) => index += used + 1,
                None => return Some(Run { start: index, count, origin, ptr }),
            }
        }
        None
    }

    /// Marks the blocks of `run` as used.
    pub fn claim(&mut self, run: &Run) {
        let end = run.start + run.count;
        for header in &mut self.headers[run.start..end] {
            *header = BlockHeader { origin: run.origin, span: 0, used: true };
        }
        self.headers[run.start].span = run.count;
        self.free_count -= run.count;
        if (run.start..end).contains(&self.first_free) {
            self.first_free = (end..self.count())
                .find(|&index| !self.headers[index].used)
                .unwrap_or(self.count());
        }
    }

    /// Releases the run headed by block `start`. Returns the number of blocks
    /// released.
    pub fn release(&mut self, start: usize) -> usize {
        let span = self.headers[start].span;
        let was_full = self.free_count == 0;
        self.headers[start..start + span].fill(BlockHeader::FREE);
        self.free_count += span;
        if was_full || start < self.first_free {
            self.first_free = start;
        }
        span
    }

    /// Resolves `ptr` to the index of the block heading its run.
    ///
    /// A pointer into a run is redirected to the run's origin. The resolved
    /// start must be a block boundary. A pointer into a free block resolves
    /// to that block.
    pub fn locate(&self, ptr: usize) -> Result<usize, Fault> {
        let raw = (ptr - self.base) / self.block_size;
        let start = match self.headers[raw].origin() {
            Some(origin) => origin,
            None => return Ok(raw),
        };
        let offset = start.wrapping_sub(self.base);
        if offset >= self.size() || offset % self.block_size != 0 {
            return Err(Fault::MisalignedBlock(ptr));
        }
        Ok(offset / self.block_size)
    }

    /// Marks every block free.
    pub fn reset(&mut self) {
        self.headers.fill(BlockHeader::FREE);
        self.first_free = 0;
        self.free_count = self.count();
    }

    /// Writes back the map record and its headers.
    pub fn publish(&self, coherency: &(impl Coherency + ?Sized)) {
        coherency.publish(Region::of(self));
        coherency.publish(Region::of_slice(self.headers));
    }

    /// Invalidates the map record and its headers.
    pub fn refresh(&self, coherency: &(impl Coherency + ?Sized)) {
        coherency.refresh(Region::of(self));
        coherency.refresh(Region::of_slice(self.headers));
    }

    /// Checks the header table against the counters and the run layout.
    pub fn is_consistent(&self) -> bool {
        let mut free = 0;
        let mut lowest_free = None;
        let mut index = 0;
        while index < self.count() {
            let head = self.headers[index];
            if !head.used {
                if head.span != 0 || head.origin != 0 {
                    return false;
                }
                lowest_free.get_or_insert(index);
                free += 1;
                index += 1;
                continue;
            }
            let end = index + head.span;
            if head.span == 0 || end > self.count() || head.origin != self.block_addr(index) {
                return false;
            }
            let tail = &self.headers[index + 1..end];
            if !tail.iter().all(|h| h.used && h.span == 0 && h.origin == head.origin) {
                return false;
            }
            index = end;
        }
        free == self.free_count && lowest_free.map_or(true, |lowest| self.first_free <= lowest)
    }
}
