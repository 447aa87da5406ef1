//! Sorting of `(key, position)` pairs for the per-object sort.
//!
//! Short slices use an iterative quicksort; long ones a bottom-up merge sort
//! whose buffer never exceeds half the slice. Neither recurses, so the
//! stack stays flat regardless of list length.

const INSERTION_THRESHOLD: usize = 16;
const MERGE_THRESHOLD: usize = 1 << 12;
const RUN: usize = 32;

/// Sorts `pairs` ascending. `buffer` is scratch space reused across calls.
pub fn pair_sort<T: Ord + Copy>(pairs: &mut [T], buffer: &mut Vec<T>) {
    match pairs.len() {
        0 | 1 => {}
        2 => {
            if pairs[1] < pairs[0] {
                pairs.swap(0, 1);
            }
        }
        n if n < MERGE_THRESHOLD => quicksort(pairs),
        _ => merge_sort(pairs, buffer),
    }
}

fn insertion_sort<T: Ord + Copy>(v: &mut [T]) {
    for i in 1..v.len() {
        let mut j = i;
        while j > 0 && v[j] < v[j - 1] {
            v.swap(j, j - 1);
            j -= 1;
        }
    }
}

fn quicksort<T: Ord + Copy>(v: &mut [T]) {
    let mut stack = vec![(0usize, v.len())];
    while let Some((mut lo, mut hi)) = stack.pop() {
        while hi - lo > INSERTION_THRESHOLD {
            let p = lo + partition(&mut v[lo..hi]);
            // Loop on the smaller side, defer the larger one.
            if p - lo < hi - p {
                stack.push((p + 1, hi));
                hi = p;
            } else {
                stack.push((lo, p));
                lo = p + 1;
            }
        }
        insertion_sort(&mut v[lo..hi]);
    }
}

/// Median-of-three Lomuto partition; returns the pivot's final index.
fn partition<T: Ord + Copy>(v: &mut [T]) -> usize {
    let last = v.len() - 1;
    let mid = v.len() / 2;
    if v[mid] < v[0] {
        v.swap(mid, 0);
    }
    if v[last] < v[0] {
        v.swap(last, 0);
    }
    if v[mid] < v[last] {
        v.swap(mid, last);
    }
    let pivot = v[last];
    let mut store = 0;
    for i in 0..last {
        if v[i] < pivot {
            v.swap(i, store);
            store += 1;
        }
    }
    v.swap(store, last);
    store
}

fn merge_sort<T: Ord + Copy>(v: &mut [T], buffer: &mut Vec<T>) {
    let n = v.len();
    for run in v.chunks_mut(RUN) {
        insertion_sort(run);
    }
    let mut width = RUN;
    while width < n {
        let mut lo = 0;
        while lo + width < n {
            let mid = lo + width;
            let hi = (lo + 2 * width).min(n);
            if v[mid] < v[mid - 1] {
                merge(&mut v[lo..hi], mid - lo, buffer);
            }
            lo = hi;
        }
        width *= 2;
    }
}

/// Merges the sorted halves `v[..mid]` and `v[mid..]`, buffering the shorter
/// one. Stable.
fn merge<T: Ord + Copy>(v: &mut [T], mid: usize, buffer: &mut Vec<T>) {
    buffer.clear();
    if mid <= v.len() - mid {
        buffer.extend_from_slice(&v[..mid]);
        let (mut i, mut j, mut k) = (0, mid, 0);
        while i < buffer.len() && j < v.len() {
            if v[j] < buffer[i] {
                v[k] = v[j];
                j += 1;
            } else {
                v[k] = buffer[i];
                i += 1;
            }
            k += 1;
        }
        while i < buffer.len() {
            v[k] = buffer[i];
            i += 1;
            k += 1;
        }
    } else {
        buffer.extend_from_slice(&v[mid..]);
        let (mut i, mut j, mut k) = (mid, buffer.len(), v.len());
        while i > 0 && j > 0 {
            k -= 1;
            if buffer[j - 1] < v[i - 1] {
                v[k] = v[i - 1];
                i -= 1;
            } else {
                v[k] = buffer[j - 1];
                j -= 1;
            }
        }
        while j > 0 {
            k -= 1;
            v[k] = buffer[j - 1];
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(len: usize, keys: u64, seed: u64) {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut pairs: Vec<(u64, u64)> = (0..len as u64).map(|i| (rng.u64(0..keys), i)).collect();
        let mut expected = pairs.clone();
        expected.sort();
        let mut buffer = Vec::new();
        pair_sort(&mut pairs, &mut buffer);
        assert_eq!(pairs, expected, "len {len} keys {keys}");
    }

    #[test]
    fn test_small_lists() {
        for len in 0..40 {
            check(len, 5, len as u64);
        }
    }

    #[test]
    fn test_quicksort_range() {
        check(100, 3, 1);
        check(1000, 1000, 2);
        check(MERGE_THRESHOLD - 1, 7, 3);
    }

    #[test]
    fn test_merge_range() {
        check(MERGE_THRESHOLD, 2, 4);
        check(10_000, 50, 5);
        check(70_001, 1 << 20, 6);
    }

    #[test]
    fn test_presorted_and_reversed() {
        let mut buffer = Vec::new();
        let mut ascending: Vec<u64> = (0..20_000).collect();
        pair_sort(&mut ascending, &mut buffer);
        assert!(ascending.windows(2).all(|w| w[0] <= w[1]));
        let mut descending: Vec<u64> = (0..20_000).rev().collect();
        pair_sort(&mut descending, &mut buffer);
        assert_eq!(descending, (0..20_000).collect::<Vec<_>>());
        let mut small_desc: Vec<u64> = (0..500).rev().collect();
        pair_sort(&mut small_desc, &mut buffer);
        assert_eq!(small_desc, (0..500).collect::<Vec<_>>());
    }
}
