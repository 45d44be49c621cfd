//! Synchronization primitives.

macro_rules! maybe_const_fn {
    (
        $(#[$($attr:tt)*])*
        $vis:vis const fn $name:ident($($args:tt)*) -> $ret:ty { $($body:tt)* }
    ) => {
        #[cfg(not(loom))]
        $(#[$($attr)*])* $vis const fn $name($($args)*) -> $ret { $($body)* }
        #[cfg(loom)]
        $(#[$($attr)*])* $vis fn $name($($args)*) -> $ret { $($body)* }
    };
}

mod spin;

pub use self::spin::{SpinLock, SpinLockGuard};
