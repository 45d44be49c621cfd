#![cfg(loom)]

#[macro_use]
mod loom_helpers;

use self::loom_helpers::*;
use dsp_heap::platform::{Coherency, Platform, Region};
use dsp_heap::sync::SpinLock;

struct Core(usize);

impl Coherency for Core {
    fn publish(&self, _region: Region) {}

    fn refresh(&self, _region: Region) {}
}

impl Platform for Core {
    fn core_id(&self) -> usize {
        self.0
    }

    fn save_and_disable_interrupts(&self) -> usize {
        0
    }

    fn restore_interrupts(&self, _state: usize) {}
}

#[test]
fn loom_exclusive() {
    let counter_states = statemap![
        1 => [2],
        10 => [2],
    ];
    loom::model(|| {
        let lock: &'static _ = Box::leak(Box::new(SpinLock::new(0_usize)));
        let increment = move |core: usize| {
            let platform = Core(core);
            let mut guard = lock.lock(&platform);
            let seen = *guard;
            loom::thread::yield_now();
            *guard = seen + 1;
            seen
        };
        let a = loom::thread::spawn(move || increment(1));
        let b = loom::thread::spawn(move || increment(2));
        let a = a.join().unwrap();
        let b = b.join().unwrap();
        let total = *lock.lock(&Core(0));
        statemap_put(counter_states, a * 10 + b, total);
    });
    statemap_check_exhaustive(counter_states);
}

#[test]
fn loom_same_core_in_turn() {
    let counter_states = statemap![
        3 => [2],
    ];
    loom::model(|| {
        let lock: &'static _ = Box::leak(Box::new(SpinLock::new(0_usize)));
        let a = loom::thread::spawn(move || {
            *lock.lock(&Core(1)) += 1;
            1
        });
        let b = loom::thread::spawn(move || {
            *lock.lock(&Core(2)) += 1;
            2
        });
        let key = a.join().unwrap() + b.join().unwrap();
        // The owner is cleared on unlock, so core 1 may take the lock again.
        statemap_put(counter_states, key, *lock.lock(&Core(1)));
    });
    statemap_check_exhaustive(counter_states);
}
