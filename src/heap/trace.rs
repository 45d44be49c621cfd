use super::validate::Anomaly;
use super::{AllocError, Caps, Zone, Zones};
use log::Level;

const TARGET: &str = "heap";

#[inline(always)]
pub fn allocate(zone: Zone, caps: Caps, bytes: usize, align: usize, ptr: usize) {
    #[inline(never)]
    fn trace(zone: Zone, caps: Caps, bytes: usize, align: usize, ptr: usize) {
        log::trace!(target: TARGET, "alloc {zone} {caps:?} {bytes}/{align} -> {ptr:#x}");
    }
    if log::log_enabled!(target: TARGET, Level::Trace) {
        trace(zone, caps, bytes, align, ptr);
    }
}

#[inline(always)]
pub fn allocate_failed(zone: Zone, caps: Caps, bytes: usize, align: usize, err: AllocError) {
    #[inline(never)]
    fn trace(zone: Zone, caps: Caps, bytes: usize, align: usize, err: AllocError) {
        log::warn!(target: TARGET, "alloc {zone} {caps:?} {bytes}/{align} failed: {err}");
    }
    if log::log_enabled!(target: TARGET, Level::Warn) {
        trace(zone, caps, bytes, align, err);
    }
}

#[inline(always)]
pub fn fallback(caps: Caps) {
    #[inline(never)]
    fn trace(caps: Caps) {
        log::trace!(target: TARGET, "no runtime heap provides {caps:?}, falling back to buffer");
    }
    if log::log_enabled!(target: TARGET, Level::Trace) {
        trace(caps);
    }
}

#[inline(always)]
pub fn free(zone: Zone, ptr: usize, bytes: usize) {
    #[inline(never)]
    fn trace(zone: Zone, ptr: usize, bytes: usize) {
        log::trace!(target: TARGET, "free {zone} {ptr:#x} ({bytes} bytes)");
    }
    if log::log_enabled!(target: TARGET, Level::Trace) {
        trace(zone, ptr, bytes);
    }
}

#[inline(always)]
pub fn reallocate(old: usize, new: usize, bytes: usize) {
    #[inline(never)]
    fn trace(old: usize, new: usize, bytes: usize) {
        log::trace!(target: TARGET, "realloc {old:#x} -> {new:#x} ({bytes} bytes)");
    }
    if log::log_enabled!(target: TARGET, Level::Trace) {
        trace(old, new, bytes);
    }
}

#[inline(always)]
pub fn reset(zone: Zone, core: usize) {
    #[inline(never)]
    fn trace(zone: Zone, core: usize) {
        log::info!(target: TARGET, "{zone} heap of core {core} reset");
    }
    if log::log_enabled!(target: TARGET, Level::Info) {
        trace(zone, core);
    }
}

#[inline(always)]
pub fn double_free(ptr: usize) {
    #[inline(never)]
    fn trace(ptr: usize) {
        log::error!(target: TARGET, "double free of {ptr:#x}");
    }
    if log::log_enabled!(target: TARGET, Level::Error) {
        trace(ptr);
    }
}

#[inline(always)]
pub fn anomaly(anomaly: Anomaly) {
    #[inline(never)]
    fn trace(anomaly: Anomaly) {
        match anomaly {
            Anomaly::WriteAfterFree { addr, len } => {
                log::error!(target: TARGET, "write after free in {addr:#x}..{:#x}", addr + len);
            }
            Anomaly::DoubleFree(ptr) => log::error!(target: TARGET, "double free of {ptr:#x}"),
            Anomaly::Corruption(ptr) => {
                log::error!(target: TARGET, "free of {ptr:#x} found corrupted free memory");
            }
        }
    }
    if log::log_enabled!(target: TARGET, Level::Error) {
        trace(anomaly);
    }
}

/// Logs every heap and block map at info level.
pub fn dump(zones: &Zones<'_>) {
    if !log::log_enabled!(target: TARGET, Level::Info) {
        return;
    }
    for (zone, index, heap) in zones.iter() {
        log::info!(
            target: TARGET,
            "{zone}[{index}] {:#x}..{:#x} {:?} used {} free {}",
            heap.base(),
            heap.base() + heap.size(),
            heap.caps(),
            heap.used(),
            heap.free(),
        );
        for map in heap.maps() {
            log::info!(
                target: TARGET,
                "  {}x{} at {:#x} free {} hint {}",
                map.block_size(),
                map.count(),
                map.base(),
                map.free_count(),
                map.first_free(),
            );
        }
    }
}
