//! Set differences between migrations on disk and migrations applied.

use std::collections::BTreeSet;

use crate::version::Version;

/// Splits two collections into the items only in `first` and the items only
/// in `second`. Items present in both are dropped.
pub fn partition<T, A, B>(first: A, second: B) -> (BTreeSet<T>, BTreeSet<T>)
where
    T: Ord,
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
{
    let first: BTreeSet<T> = first.into_iter().collect();
    let mut only_in_second: BTreeSet<T> = second.into_iter().collect();

    let mut only_in_first = BTreeSet::new();
    for item in first {
        if !only_in_second.remove(&item) {
            only_in_first.insert(item);
        }
    }
    (only_in_first, only_in_second)
}

/// Versions found on disk that the ledger does not hold yet.
pub fn pending<A, B>(on_disk: A, applied: B) -> BTreeSet<Version>
where
    A: IntoIterator<Item = Version>,
    B: IntoIterator<Item = Version>,
{
    partition(on_disk, applied).0
}
