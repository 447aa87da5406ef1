use bytemuck::{Pod, Zeroable};

/// A triple of dictionary IDs. IDs start at 1; 0 marks an unbound component
/// and acts as a wildcard in search patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct TripleId {
    pub subject: u64,
    pub predicate: u64,
    pub object: u64,
}

impl TripleId {
    pub const fn new(subject: u64, predicate: u64, object: u64) -> TripleId {
        TripleId {
            subject,
            predicate,
            object,
        }
    }

    /// The all-wildcard pattern.
    pub const fn any() -> TripleId {
        TripleId::new(0, 0, 0)
    }

    /// `true` when every component is bound.
    pub fn is_complete(&self) -> bool {
        self.subject != 0 && self.predicate != 0 && self.object != 0
    }

    /// `true` when every bound component of `pattern` equals the one here.
    pub fn matches(&self, pattern: &TripleId) -> bool {
        (pattern.subject == 0 || pattern.subject == self.subject)
            && (pattern.predicate == 0 || pattern.predicate == self.predicate)
            && (pattern.object == 0 || pattern.object == self.object)
    }

    pub fn to_array(&self) -> [u64; 3] {
        [self.subject, self.predicate, self.object]
    }

    pub fn from_array(spo: [u64; 3]) -> TripleId {
        TripleId::new(spo[0], spo[1], spo[2])
    }
}

impl From<(u64, u64, u64)> for TripleId {
    fn from((s, p, o): (u64, u64, u64)) -> Self {
        TripleId::new(s, p, o)
    }
}

impl std::fmt::Display for TripleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::TripleId;

    #[test]
    fn test_pattern_matching() {
        let t = TripleId::new(3, 5, 7);
        assert!(t.matches(&TripleId::any()));
        assert!(t.matches(&TripleId::new(3, 0, 7)));
        assert!(!t.matches(&TripleId::new(0, 4, 0)));
        assert!(t.is_complete());
        assert!(!TripleId::new(1, 0, 1).is_complete());
        assert_eq!(t.to_string(), "(3, 5, 7)");
    }
}
