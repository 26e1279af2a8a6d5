//! Set differences over ordered string collections.
//!
//! Output order follows input order so repeated runs produce the same
//! deletions in the same sequence.

use std::collections::HashSet;

/// Elements of `a` that are absent from `b`, in `a`'s order, without repeats.
pub fn only_in<A, B>(a: &[A], b: &[B]) -> Vec<String>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let other: HashSet<&str> = b.iter().map(AsRef::as_ref).collect();
    let mut seen = HashSet::new();
    a.iter()
        .map(AsRef::as_ref)
        .filter(|item| !other.contains(item) && seen.insert(*item))
        .map(str::to_string)
        .collect()
}

/// Elements present in exactly one of `a` and `b`.
///
/// Unique-to-`a` elements come first, then unique-to-`b` elements.
pub fn symmetric_difference<A, B>(a: &[A], b: &[B]) -> Vec<String>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let mut diff = only_in(a, b);
    diff.extend(only_in(b, a));
    diff
}
