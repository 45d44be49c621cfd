use super::{Caps, Fault, Heap};
use crate::platform::Coherency;
use core::fmt;

/// Allocation zones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "host", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "host", serde(rename_all = "lowercase"))]
pub enum Zone {
    /// Per-core memory that is never freed piecemeal. Allocation bumps a
    /// counter. A secondary core may reset its own fixed heap wholesale.
    Fixed,
    /// Per-core block-mapped memory for short-lived data of the core.
    Startup,
    /// Shared block-mapped memory for long-lived data.
    Runtime,
    /// Shared block-mapped memory for large and aligned buffers.
    Buffer,
}

impl Zone {
    /// All zones in lookup order.
    pub const ALL: [Self; 4] = [Self::Fixed, Self::Startup, Self::Runtime, Self::Buffer];

    /// Returns `true` for zones holding one heap per core.
    #[inline]
    pub const fn is_per_core(self) -> bool {
        matches!(self, Self::Fixed | Self::Startup)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fixed => "fixed",
            Self::Startup => "startup",
            Self::Runtime => "runtime",
            Self::Buffer => "buffer",
        })
    }
}

/// Position of a block inside the zone registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockLoc {
    pub(crate) zone: Zone,
    pub(crate) heap: usize,
    pub(crate) map: usize,
    pub(crate) block: usize,
}

/// The heap registry.
///
/// Per-core zones are indexed by core id. Shared zones are searched in
/// declaration order.
#[derive(Debug)]
pub struct Zones<'a> {
    fixed: &'a mut [Heap<'a>],
    startup: &'a mut [Heap<'a>],
    runtime: &'a mut [Heap<'a>],
    buffer: &'a mut [Heap<'a>],
}

impl<'a> Zones<'a> {
    /// Creates a new registry.
    pub fn new(
        fixed: &'a mut [Heap<'a>],
        startup: &'a mut [Heap<'a>],
        runtime: &'a mut [Heap<'a>],
        buffer: &'a mut [Heap<'a>],
    ) -> Self {
        Self { fixed, startup, runtime, buffer }
    }

    /// Returns the number of cores with a fixed heap.
    #[inline]
    pub fn cores(&self) -> usize {
        self.fixed.len()
    }

    /// Returns the heaps of `zone`.
    pub fn table(&self, zone: Zone) -> &[Heap<'a>] {
        match zone {
            Zone::Fixed => &*self.fixed,
            Zone::Startup => &*self.startup,
            Zone::Runtime => &*self.runtime,
            Zone::Buffer => &*self.buffer,
        }
    }

    pub(crate) fn table_mut(&mut self, zone: Zone) -> &mut [Heap<'a>] {
        match zone {
            Zone::Fixed => &mut *self.fixed,
            Zone::Startup => &mut *self.startup,
            Zone::Runtime => &mut *self.runtime,
            Zone::Buffer => &mut *self.buffer,
        }
    }

    /// Returns heap `index` of `zone`.
    #[inline]
    pub fn heap(&self, zone: Zone, index: usize) -> Option<&Heap<'a>> {
        self.table(zone).get(index)
    }

    pub(crate) fn heap_mut(&mut self, zone: Zone, index: usize) -> Option<&mut Heap<'a>> {
        self.table_mut(zone).get_mut(index)
    }

    /// Iterates over all heaps with their zones and indices.
    pub fn iter(&self) -> impl Iterator<Item = (Zone, usize, &Heap<'a>)> {
        Zone::ALL.into_iter().flat_map(move |zone| {
            self.table(zone).iter().enumerate().map(move |(index, heap)| (zone, index, heap))
        })
    }

    /// Tiles the block maps of every heap.
    pub fn tile(&mut self) -> Result<(), Fault> {
        Zone::ALL
            .into_iter()
            .try_for_each(|zone| self.table_mut(zone).iter_mut().try_for_each(Heap::tile))
    }

    /// Finds the heap containing `addr`.
    ///
    /// Searches fixed heaps of all cores, then the startup heap of `core`,
    /// then runtime and buffer heaps. Every heap record is refreshed before
    /// its range is tested.
    pub fn find_heap_for_pointer(
        &self,
        addr: usize,
        core: usize,
        coherency: &(impl Coherency + ?Sized),
    ) -> Option<(Zone, usize)> {
        let hit = |zone: Zone, index: usize, heap: &Heap<'_>| {
            heap.refresh_record(coherency);
            heap.contains(addr).then_some((zone, index))
        };
        let shared = |zone: Zone, table: &[Heap<'_>]| {
            table.iter().enumerate().find_map(|(index, heap)| hit(zone, index, heap))
        };
        shared(Zone::Fixed, self.table(Zone::Fixed))
            .or_else(|| self.startup.get(core).and_then(|heap| hit(Zone::Startup, core, heap)))
            .or_else(|| shared(Zone::Runtime, self.table(Zone::Runtime)))
            .or_else(|| shared(Zone::Buffer, self.table(Zone::Buffer)))
    }

    /// Resolves `addr` to the block heading its run. Refreshes the owning
    /// block map.
    pub(crate) fn locate(
        &self,
        addr: usize,
        core: usize,
        coherency: &(impl Coherency + ?Sized),
    ) -> Result<BlockLoc, Fault> {
        let (zone, heap) =
            self.find_heap_for_pointer(addr, core, coherency).ok_or(Fault::UnknownPointer(addr))?;
        if zone == Zone::Fixed {
            return Err(Fault::FixedZoneFree(addr));
        }
        let heap_ref = &self.table(zone)[heap];
        let map = heap_ref.locate(addr).ok_or(Fault::UnknownPointer(addr))?;
        let map_ref = heap_ref.map(map);
        map_ref.refresh(coherency);
        let block = map_ref.locate(addr)?;
        Ok(BlockLoc { zone, heap, map, block })
    }
}

/// Returns the first heap of `table` providing `caps`.
pub fn find_heap_for_caps<'h, 'a>(
    table: &'h [Heap<'a>],
    caps: Caps,
) -> Option<(usize, &'h Heap<'a>)> {
    table.iter().enumerate().find(|(_, heap)| heap.caps().satisfies(caps))
}
