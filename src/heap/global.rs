use super::{Allocator, Caps, Zone};
use crate::platform::Platform;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

/// [`GlobalAlloc`] adapter serving every request from one zone.
///
/// ```
/// use core::alloc::{GlobalAlloc, Layout};
/// use dsp_heap::config::Layout as HeapLayout;
/// use dsp_heap::heap::{Caps, Config, GlobalHeap, Zone};
/// use dsp_heap::platform::Uniprocessor;
///
/// let layout = HeapLayout::parse(
///     r#"
///     [[heap.runtime]]
///     size = "512"
///     caps = "RAM"
///     pools = [{ block = "32", capacity = 16 }]
///     "#,
/// )
/// .unwrap();
/// let heap = dsp_heap::host::allocator(&layout, Uniprocessor, Config::new()).unwrap();
/// let global = GlobalHeap::new(&heap, Zone::Runtime, Caps::RAM);
/// unsafe {
///     let ptr = global.alloc(Layout::new::<u64>());
///     assert!(!ptr.is_null());
///     global.dealloc(ptr, Layout::new::<u64>());
/// }
/// ```
pub struct GlobalHeap<'h, 'a, P: Platform> {
    allocator: &'h Allocator<'a, P>,
    zone: Zone,
    caps: Caps,
}

impl<'h, 'a, P: Platform> GlobalHeap<'h, 'a, P> {
    /// Creates a new adapter.
    #[inline]
    pub const fn new(allocator: &'h Allocator<'a, P>, zone: Zone, caps: Caps) -> Self {
        Self { allocator, zone, caps }
    }

    fn align(&self, layout: Layout) -> usize {
        layout.align().max(self.allocator.config().default_align)
    }
}

unsafe impl<P: Platform> GlobalAlloc for GlobalHeap<'_, '_, P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocator
            .allocate_aligned(self.zone, self.caps, layout.size(), self.align(layout))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.allocator.free(ptr);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() <= self.allocator.config().default_align {
            return self
                .allocator
                .reallocate(ptr, self.zone, self.caps, new_size)
                .map_or(ptr::null_mut(), NonNull::as_ptr);
        }
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        let new_ptr = unsafe { self.alloc(new_layout) };
        if !new_ptr.is_null() {
            unsafe {
                ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
        }
        new_ptr
    }
}
