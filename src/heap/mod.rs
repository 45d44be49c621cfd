//! Zone and block-map heap.
//!
//! Heap memory of the firmware is a handful of physical regions declared at
//! build time. The regions are grouped into zones with different lifetime
//! rules:
//!
//! * [`Zone::Fixed`]: one heap per core, allocated by bumping a counter and
//!   never freed piecemeal;
//! * [`Zone::Startup`]: one heap per core for short-lived data of the core;
//! * [`Zone::Runtime`]: shared heaps for long-lived data;
//! * [`Zone::Buffer`]: shared heaps for large and aligned buffers.
//!
//! Every heap advertises its memory [`Caps`]. A shared zone serves a request
//! from the first heap whose capabilities cover the requested ones. A runtime
//! request that no runtime heap can match is moved to the buffer zone.
//!
//! A heap outside the fixed zone is split into [`BlockMap`]s, each one a size
//! class of equal blocks with one [`BlockHeader`] per block. A request fitting
//! into a single block takes the first suitable block of the smallest size
//! class. A larger request takes a run of consecutive blocks of one size
//! class, searching the largest classes first. Alignment padding never moves
//! the headers: every header of a run records the run origin, so a free of the
//! aligned pointer recovers the whole run.
//!
//! All operations are synchronous and bounded. Exhaustion is reported with
//! [`AllocError`]. Misuse, such as a bad alignment or a free of fixed memory,
//! [`halt`]s the system with a [`Fault`].
//!
//! # Usage
//!
//! Describe the memory layout:
//!
//! ```toml
//! [[heap.fixed]]
//! size = "4K"
//! caps = "RAM | CACHE"
//!
//! [[heap.startup]]
//! size = "8K"
//! caps = "RAM | CACHE"
//! pools = [
//!     { block = "64", capacity = 64 },
//!     { block = "512", capacity = 8 },
//! ]
//!
//! [[heap.runtime]]
//! size = "10K"
//! caps = "RAM | CACHE | DMA"
//! pools = [
//!     { block = "16", capacity = 128 },
//!     { block = "128", capacity = 32 },
//!     { block = "1K", capacity = 4 },
//! ]
//! ```
//!
//! Then allocate:
//!
//! ```
//! # let toml = r#"
//! # [[heap.fixed]]
//! # size = "4K"
//! # caps = "RAM | CACHE"
//! # [[heap.runtime]]
//! # size = "10K"
//! # caps = "RAM | CACHE | DMA"
//! # pools = [
//! #     { block = "16", capacity = 128 },
//! #     { block = "128", capacity = 32 },
//! #     { block = "1K", capacity = 4 },
//! # ]
//! # "#;
//! use dsp_heap::config::Layout;
//! use dsp_heap::heap::{Caps, Config, Zone};
//! use dsp_heap::platform::Uniprocessor;
//!
//! let layout = Layout::parse(toml).unwrap();
//! let heap = dsp_heap::host::allocator(&layout, Uniprocessor, Config::new()).unwrap();
//!
//! let ptr = heap.allocate(Zone::Runtime, Caps::RAM | Caps::DMA, 100).unwrap();
//! heap.free(ptr.as_ptr());
//!
//! let table = heap.allocate_zeroed(Zone::Fixed, Caps::RAM, 256).unwrap();
//! assert_eq!(table.as_ptr() as usize % 64, 0);
//! ```
//!
//! Firmware builds describe the zones with statically allocated
//! [`Heap`]s and [`BlockMap`]s and pass them to [`Allocator::new`].

mod allocator;
mod caps;
mod config;
mod fault;
mod global;
mod map;
mod region;
mod trace;
pub mod validate;
mod zone;

pub use self::{
    allocator::{AllocError, Allocator, Usage},
    caps::Caps,
    config::Config,
    fault::{halt, Fault},
    global::GlobalHeap,
    map::{BlockHeader, BlockMap, Run},
    region::{Claim, Heap, HeapInfo},
    validate::{Anomaly, ValidationReport, SENTINEL},
    zone::{find_heap_for_caps, Zone, Zones},
};

/// Rounds `addr` up to a multiple of `align`, which must be a power of two.
#[inline]
pub(crate) const fn align_up(addr: usize, align: usize) -> Option<usize> {
    match addr.checked_add(align - 1) {
        Some(sum) => Some(sum & !(align - 1)),
        None => None,
    }
}
