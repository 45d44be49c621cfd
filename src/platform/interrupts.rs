use super::Platform;

/// Critical section guard.
///
/// Masks interrupts of the calling core through the [`Platform`] when
/// created, and puts back the saved mask when dropped. Guards nest: only the
/// outermost one unmasks.
///
/// The heap lock is always taken inside a critical section, so an interrupt
/// handler can't preempt an allocator operation on the same core and spin on
/// the lock forever.
pub struct Interrupts<'a, P: Platform + ?Sized> {
    platform: &'a P,
    save: usize,
}

impl<'a, P: Platform + ?Sized> Interrupts<'a, P> {
    /// Masks interrupts of the current core until the returned guard is
    /// dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use dsp_heap::platform::{Interrupts, Uniprocessor};
    ///
    /// let mut x = 0;
    /// {
    ///     let _critical = Interrupts::pause(&Uniprocessor);
    ///     x += 1;
    /// }
    /// assert_eq!(x, 1);
    /// ```
    #[inline]
    pub fn pause(platform: &'a P) -> Self {
        Self { platform, save: platform.save_and_disable_interrupts() }
    }

    /// Runs a closure inside a critical section.
    #[inline]
    pub fn paused<R, F: FnOnce() -> R>(platform: &'a P, f: F) -> R {
        let _paused = Self::pause(platform);
        f()
    }
}

impl<P: Platform + ?Sized> Drop for Interrupts<'_, P> {
    fn drop(&mut self) {
        self.platform.restore_interrupts(self.save);
    }
}
