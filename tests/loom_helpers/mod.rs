use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;

/// Outcome table of a loom model: for every key, the values allowed to be
/// observed with it, each with a hit counter.
pub type StateMap = BTreeMap<usize, BTreeMap<usize, AtomicUsize>>;

macro_rules! statemap {
    ($($key:literal => [$($value:literal),*$(,)?]),*$(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::loom_helpers::StateMap::new();
        $(
            let inner = map.entry($key).or_default();
            $(inner.insert($value, std::sync::atomic::AtomicUsize::new(0));)*
        )*
        let map: &'static _ = Box::leak(Box::new(map));
        map
    }};
}

/// Records that the model ended with `value` observed under `key`.
#[track_caller]
pub fn statemap_put(statemap: &'static StateMap, key: usize, value: usize) {
    match statemap.get(&key).map(|values| values.get(&value)) {
        Some(Some(counter)) => {
            counter.fetch_add(1, SeqCst);
        }
        Some(None) => panic!("unexpected outcome {key} => {value}"),
        None => panic!("unexpected key {key} (=> {value})"),
    }
}

/// Checks that every allowed outcome was reached by some interleaving.
#[track_caller]
pub fn statemap_check_exhaustive(statemap: &'static StateMap) {
    for (key, values) in statemap {
        for (value, counter) in values {
            assert_ne!(counter.load(SeqCst), 0, "{key} => {value} never reached");
        }
    }
}
