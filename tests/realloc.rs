use core::alloc::{GlobalAlloc, Layout as MemoryLayout};
use dsp_heap::config::Layout;
use dsp_heap::heap::{AllocError, Allocator, Caps, Config, GlobalHeap, Zone};
use dsp_heap::host;
use dsp_heap::platform::Uniprocessor;
use std::ptr;
use std::slice;

const LAYOUT: &str = r#"
[[heap.runtime]]
size = "768"
caps = "RAM"
pools = [
    { block = "32", capacity = 8 },
    { block = "256", capacity = 2 },
]
"#;

fn make_heap() -> Allocator<'static, Uniprocessor> {
    host::allocator(&Layout::parse(LAYOUT).unwrap(), Uniprocessor, Config::new()).unwrap()
}

fn bytes<'a>(ptr: *mut u8, len: usize) -> &'a mut [u8] {
    unsafe { slice::from_raw_parts_mut(ptr, len) }
}

fn fill_pattern(ptr: *mut u8, len: usize) {
    bytes(ptr, len).iter_mut().enumerate().for_each(|(i, byte)| *byte = i as u8);
}

fn has_pattern(ptr: *mut u8, len: usize) -> bool {
    bytes(ptr, len).iter().enumerate().all(|(i, &byte)| byte == i as u8)
}

fn used(heap: &Allocator<'_, Uniprocessor>) -> usize {
    heap.heap_info(Zone::Runtime, 0).unwrap().used
}

#[test]
fn grow_and_shrink() {
    let heap = make_heap();
    let small = heap.allocate(Zone::Runtime, Caps::RAM, 16).unwrap().as_ptr();
    fill_pattern(small, 16);

    let large = heap.reallocate(small, Zone::Runtime, Caps::RAM, 100).unwrap().as_ptr();
    assert_ne!(large, small);
    assert!(has_pattern(large, 16));
    assert_eq!(heap.usable_size(large), 256);
    assert_eq!(used(&heap), 256);

    fill_pattern(large, 100);
    let back = heap.reallocate(large, Zone::Runtime, Caps::RAM, 8).unwrap().as_ptr();
    assert_eq!(back, small);
    assert!(has_pattern(back, 8));
    assert_eq!(used(&heap), 32);
}

#[test]
fn failure_keeps_the_old_allocation() {
    let heap = make_heap();
    let ptr = heap.allocate(Zone::Runtime, Caps::RAM, 24).unwrap().as_ptr();
    fill_pattern(ptr, 24);
    assert_eq!(heap.reallocate(ptr, Zone::Runtime, Caps::RAM, 4096), Err(AllocError::OutOfMemory));
    assert_eq!(heap.reallocate(ptr, Zone::Runtime, Caps::RAM, 0), Err(AllocError::ZeroSize));
    let no_dma = Err(AllocError::NoMatchingHeap(Caps::DMA));
    assert_eq!(heap.reallocate(ptr, Zone::Runtime, Caps::DMA, 8), no_dma);
    assert!(has_pattern(ptr, 24));
    assert_eq!(heap.usable_size(ptr), 32);
    assert_eq!(used(&heap), 32);
}

#[test]
fn null_reallocates_as_allocate() {
    let heap = make_heap();
    let ptr = heap.reallocate(ptr::null_mut(), Zone::Runtime, Caps::RAM, 16).unwrap();
    assert_eq!(heap.usable_size(ptr.as_ptr()), 32);
    assert_eq!(used(&heap), 32);
}

#[test]
fn global_adapter() {
    let heap = make_heap();
    let global = GlobalHeap::new(&heap, Zone::Runtime, Caps::RAM);
    unsafe {
        let word = MemoryLayout::new::<u64>();
        let ptr = global.alloc(word);
        assert_eq!(ptr as usize % 8, 0);
        fill_pattern(ptr, 8);
        let ptr = global.realloc(ptr, word, 40);
        assert!(!ptr.is_null());
        assert!(has_pattern(ptr, 8));
        global.dealloc(ptr, MemoryLayout::from_size_align(40, 8).unwrap());
        assert_eq!(used(&heap), 0);

        let wide = MemoryLayout::from_size_align(200, 128).unwrap();
        let ptr = global.alloc(wide);
        assert_eq!(ptr as usize % 128, 0);
        fill_pattern(ptr, 200);
        let moved = global.realloc(ptr, wide, 220);
        assert_eq!(moved as usize % 128, 0);
        assert!(has_pattern(moved, 200));
        assert_eq!(used(&heap), 256);
        assert!(global.alloc(MemoryLayout::from_size_align(1024, 8).unwrap()).is_null());
        global.dealloc(moved, MemoryLayout::from_size_align(220, 128).unwrap());
        assert_eq!(used(&heap), 0);
    }
}
