//! Brute-force answers to triple patterns.

use crate::Spo;

/// `true` when every non-zero component of `pattern` equals `triple`'s.
pub fn matches(triple: &Spo, pattern: &Spo) -> bool {
    triple
        .iter()
        .zip(pattern.iter())
        .all(|(&t, &p)| p == 0 || p == t)
}

/// Every triple matching `pattern`, sorted by `(s, p, o)`.
pub fn filter(triples: &[Spo], pattern: &Spo) -> Vec<Spo> {
    let mut found: Vec<Spo> = triples
        .iter()
        .filter(|t| matches(t, pattern))
        .copied()
        .collect();
    found.sort_unstable();
    found
}

/// The eight patterns obtained from `triple` by unbinding any subset of its
/// components.
pub fn patterns_of(triple: &Spo) -> Vec<Spo> {
    (0..8u8)
        .map(|mask| {
            let mut pattern = [0u64; 3];
            for (i, slot) in pattern.iter_mut().enumerate() {
                if mask & (4 >> i) != 0 {
                    *slot = triple[i];
                }
            }
            pattern
        })
        .collect()
}
