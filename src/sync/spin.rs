use crate::heap::{halt, Fault};
use crate::platform::{Interrupts, Platform};
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

#[cfg(not(loom))]
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering::*};
#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering::*};

const NO_OWNER: usize = usize::MAX;

/// A spin lock taken with interrupts of the current core disabled.
///
/// The lock remembers the core holding it. An attempt to take the lock again
/// from the owning core (for example from an interrupt handler that slipped
/// in, or from a recursive call) can never succeed, so it halts the system
/// with [`Fault::LockReentered`] instead of spinning forever.
pub struct SpinLock<T> {
    lock: AtomicBool,
    owner: AtomicUsize,
    data: UnsafeCell<T>,
}

/// Access to the data of a held [`SpinLock`].
///
/// Dropping the guard releases the lock first, then restores the interrupt
/// mask saved by [`lock`](SpinLock::lock).
#[must_use]
pub struct SpinLockGuard<'a, T, P: Platform + ?Sized> {
    lock: &'a SpinLock<T>,
    _critical: Interrupts<'a, P>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    maybe_const_fn! {
        /// Creates an unlocked spin lock holding `data`.
        #[inline]
        pub const fn new(data: T) -> Self {
            Self {
                lock: AtomicBool::new(false),
                owner: AtomicUsize::new(NO_OWNER),
                data: UnsafeCell::new(data),
            }
        }
    }

    /// Acquires this lock on behalf of the current core of `platform`,
    /// spinning until it's available.
    ///
    /// # Examples
    ///
    /// ```
    /// use dsp_heap::platform::Uniprocessor;
    /// use dsp_heap::sync::SpinLock;
    ///
    /// let lock = SpinLock::new(1);
    /// *lock.lock(&Uniprocessor) += 1;
    /// assert_eq!(*lock.lock(&Uniprocessor), 2);
    /// ```
    pub fn lock<'a, P: Platform + ?Sized>(&'a self, platform: &'a P) -> SpinLockGuard<'a, T, P> {
        let core = platform.core_id();
        let critical = Interrupts::pause(platform);
        if self.owner.load(Relaxed) == core {
            halt(Fault::LockReentered(core));
        }
        while self.lock.compare_exchange_weak(false, true, Acquire, Relaxed).is_err() {
            while self.lock.load(Relaxed) {
                #[cfg(not(loom))]
                core::hint::spin_loop();
                #[cfg(loom)]
                loom::hint::spin_loop();
            }
        }
        self.owner.store(core, Relaxed);
        SpinLockGuard { lock: self, _critical: critical }
    }
}

impl<T, P: Platform + ?Sized> Deref for SpinLockGuard<'_, T, P> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, P: Platform + ?Sized> DerefMut for SpinLockGuard<'_, T, P> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, P: Platform + ?Sized> Drop for SpinLockGuard<'_, T, P> {
    #[inline]
    fn drop(&mut self) {
        self.lock.owner.store(NO_OWNER, Relaxed);
        self.lock.lock.store(false, Release);
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock").field("locked", &self.lock.load(Relaxed)).finish_non_exhaustive()
    }
}
