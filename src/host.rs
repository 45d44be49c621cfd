//! Heaps backed by host memory.
//!
//! Builds a live allocator from a [`Layout`] for tests and host-side
//! simulation. Every heap gets its own page-aligned chunk of host memory.
//! The memory and the metadata are leaked: the heaps live until the process
//! exits.

use crate::config::{ConfigError, HeapLayout, Layout};
use crate::heap::{Allocator, BlockHeader, BlockMap, Config, Heap, Zone, Zones};
use crate::platform::Platform;
use std::alloc::{self, Layout as MemoryLayout};

const PAGE_SIZE: usize = 4096;

/// Builds the heap registry for `layout`.
pub fn zones(layout: &Layout) -> Result<Zones<'static>, ConfigError> {
    layout.validate()?;
    let table = |zone: Zone| -> Result<&'static mut [Heap<'static>], ConfigError> {
        let heaps = layout.heaps(zone).iter().map(heap).collect::<Result<Vec<_>, _>>()?;
        Ok(Box::leak(heaps.into_boxed_slice()))
    };
    Ok(Zones::new(
        table(Zone::Fixed)?,
        table(Zone::Startup)?,
        table(Zone::Runtime)?,
        table(Zone::Buffer)?,
    ))
}

/// Boots an allocator for `layout`.
pub fn allocator<P: Platform>(
    layout: &Layout,
    platform: P,
    config: Config,
) -> Result<Allocator<'static, P>, ConfigError> {
    let zones = zones(layout)?;
    // Every heap owns a fresh leaked chunk, and the metadata lives apart.
    Ok(unsafe { Allocator::new(platform, config, zones) })
}

fn heap(layout: &HeapLayout) -> Result<Heap<'static>, ConfigError> {
    let base = memory(layout.size)?;
    if layout.pools.is_empty() {
        return Ok(Heap::fixed(base, layout.size, layout.caps));
    }
    let maps = layout
        .pools
        .iter()
        .map(|pool| {
            let headers = vec![BlockHeader::FREE; pool.capacity].into_boxed_slice();
            BlockMap::new(pool.block, Box::leak(headers))
        })
        .collect::<Vec<_>>();
    Ok(Heap::new(base, layout.size, layout.caps, Box::leak(maps.into_boxed_slice())))
}

fn memory(size: usize) -> Result<usize, ConfigError> {
    let layout = MemoryLayout::from_size_align(size.max(1), PAGE_SIZE)
        .map_err(|_| ConfigError::HostMemory(size))?;
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(ConfigError::HostMemory(size));
    }
    Ok(ptr as usize)
}
