//! Debug checks of free memory.
//!
//! With [`Config::validate`](super::Config::validate) on, free memory of
//! block-mapped heaps holds [`SENTINEL`] bytes. Allocation expects the pattern
//! intact, and a repeated free tells a stale double free from corruption by
//! looking at it.

use core::ptr;

/// Byte pattern of free memory.
pub const SENTINEL: u8 = 0x5A;

/// A detected misuse of heap memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anomaly {
    /// Free memory was written before being allocated again.
    WriteAfterFree {
        /// Start of the affected run.
        addr: usize,
        /// Length of the affected run.
        len: usize,
    },
    /// A free block was freed again, and its contents are untouched.
    DoubleFree(usize),
    /// A free block was freed again, and its contents are disturbed.
    Corruption(usize),
}

/// Counters of detected anomalies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of [`Anomaly::WriteAfterFree`].
    pub write_after_free: usize,
    /// Number of [`Anomaly::DoubleFree`].
    pub double_free: usize,
    /// Number of [`Anomaly::Corruption`].
    pub corruption: usize,
}

impl ValidationReport {
    pub(crate) fn record(&mut self, anomaly: Anomaly) {
        match anomaly {
            Anomaly::WriteAfterFree { .. } => self.write_after_free += 1,
            Anomaly::DoubleFree(_) => self.double_free += 1,
            Anomaly::Corruption(_) => self.corruption += 1,
        }
    }

    /// Returns the number of recorded anomalies.
    pub fn total(&self) -> usize {
        self.write_after_free + self.double_free + self.corruption
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Fills `len` bytes at `addr` with the sentinel.
///
/// # Safety
///
/// The range must be valid for writes.
pub(crate) unsafe fn fill(addr: usize, len: usize) {
    unsafe { ptr::write_bytes(addr as *mut u8, SENTINEL, len) };
}

/// Checks that `len` bytes at `addr` hold the sentinel.
///
/// # Safety
///
/// The range must be valid for reads.
pub(crate) unsafe fn is_intact(addr: usize, len: usize) -> bool {
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, len) };
    bytes.iter().all(|&byte| byte == SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern() {
        let mut memory = [0_u8; 32];
        let addr = memory.as_mut_ptr() as usize;
        unsafe {
            assert!(!is_intact(addr, 32));
            fill(addr, 32);
            assert!(is_intact(addr, 32));
            (addr as *mut u8).add(17).write(0);
            assert!(is_intact(addr, 16));
            assert!(!is_intact(addr, 32));
        }
    }

    #[test]
    fn report() {
        let mut report = ValidationReport::default();
        assert!(report.is_clean());
        report.record(Anomaly::DoubleFree(0x10));
        report.record(Anomaly::WriteAfterFree { addr: 0x20, len: 16 });
        report.record(Anomaly::DoubleFree(0x10));
        assert_eq!(report, ValidationReport { write_after_free: 1, double_free: 2, corruption: 0 });
        assert_eq!(report.total(), 3);
    }
}
