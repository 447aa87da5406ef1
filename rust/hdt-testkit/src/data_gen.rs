//! Random triple sets.

use crate::Spo;

/// Shape of a generated triple set.
#[derive(Debug, Clone)]
pub struct TripleSetParams {
    pub subjects: u64,
    pub predicates: u64,
    pub objects: u64,
    /// Triples drawn per subject, at least one.
    pub max_per_subject: usize,
    /// Keep exact duplicates instead of removing them.
    pub duplicates: bool,
    pub seed: u64,
}

impl Default for TripleSetParams {
    fn default() -> Self {
        TripleSetParams {
            subjects: 200,
            predicates: 12,
            objects: 150,
            max_per_subject: 8,
            duplicates: false,
            seed: 0x5eed,
        }
    }
}

/// Generates triples sorted by `(s, p, o)` in which every subject in
/// `1..=subjects`, every predicate in `1..=predicates` and every object in
/// `1..=objects` occurs, so the set loads in any of the six orders.
pub fn generate(params: &TripleSetParams) -> Vec<Spo> {
    assert!(params.subjects > 0 && params.predicates > 0 && params.objects > 0);
    let mut rng = fastrand::Rng::with_seed(params.seed);
    let mut triples = Vec::new();
    for s in 1..=params.subjects {
        let n = rng.usize(1..=params.max_per_subject.max(1));
        for _ in 0..n {
            let t = [
                s,
                rng.u64(1..=params.predicates),
                rng.u64(1..=params.objects),
            ];
            triples.push(t);
            if params.duplicates && rng.u8(..) < 32 {
                triples.push(t);
            }
        }
    }
    for p in 1..=params.predicates {
        triples.push([
            rng.u64(1..=params.subjects),
            p,
            rng.u64(1..=params.objects),
        ]);
    }
    for o in 1..=params.objects {
        triples.push([
            rng.u64(1..=params.subjects),
            rng.u64(1..=params.predicates),
            o,
        ]);
    }
    triples.sort_unstable();
    if !params.duplicates {
        triples.dedup();
    }
    triples
}

/// Sorts triples by the components at `layout` (indexes into `[s, p, o]`),
/// most significant first.
pub fn sort_by_layout(triples: &mut [Spo], layout: [usize; 3]) {
    triples.sort_by_key(|t| [t[layout[0]], t[layout[1]], t[layout[2]]]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_id_occurs() {
        let params = TripleSetParams {
            subjects: 30,
            predicates: 5,
            objects: 40,
            ..Default::default()
        };
        let triples = generate(&params);
        for (component, max) in [(0, 30), (1, 5), (2, 40)] {
            for id in 1..=max {
                assert!(triples.iter().any(|t| t[component] == id), "{component}:{id}");
            }
        }
        assert!(triples.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sort_by_layout() {
        let mut triples = vec![[1, 2, 3], [2, 1, 1], [1, 1, 2]];
        sort_by_layout(&mut triples, [2, 0, 1]);
        assert_eq!(triples, vec![[2, 1, 1], [1, 1, 2], [1, 2, 3]]);
    }
}
