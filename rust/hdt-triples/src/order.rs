//! The six component orderings of a triple and conversions between them.
//!
//! An index in order `o` lays every triple out as `(x, y, z)`, where `x` is the
//! component `o` sorts on first. Converting a layout from one order to another
//! is a short fixed sequence of slot swaps looked up in a table built at
//! compile time.

use crate::triple::TripleId;

/// Triple component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Component {
    Subject = 0,
    Predicate = 1,
    Object = 2,
}

/// Sort order of a triple index, with its HDT ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TripleOrder {
    Unknown = 0,
    Spo = 1,
    Sop = 2,
    Pso = 3,
    Pos = 4,
    Osp = 5,
    Ops = 6,
}

/// Layout of each known order, as component indexes (S=0, P=1, O=2).
const LAYOUTS: [[u8; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

impl TripleOrder {
    pub const ALL: [TripleOrder; 6] = [
        TripleOrder::Spo,
        TripleOrder::Sop,
        TripleOrder::Pso,
        TripleOrder::Pos,
        TripleOrder::Osp,
        TripleOrder::Ops,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<TripleOrder> {
        match ordinal {
            0 => Some(TripleOrder::Unknown),
            1..=6 => Some(TripleOrder::ALL[ordinal as usize - 1]),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TripleOrder::Unknown => "Unknown",
            TripleOrder::Spo => "SPO",
            TripleOrder::Sop => "SOP",
            TripleOrder::Pso => "PSO",
            TripleOrder::Pos => "POS",
            TripleOrder::Osp => "OSP",
            TripleOrder::Ops => "OPS",
        }
    }

    /// Components in `(x, y, z)` position. `Unknown` is treated as SPO.
    pub fn components(self) -> [Component; 3] {
        let layout = LAYOUTS[self.layout_index()];
        layout.map(|c| match c {
            0 => Component::Subject,
            1 => Component::Predicate,
            _ => Component::Object,
        })
    }

    /// The order whose `(x, y, z)` are the given components.
    pub fn from_components(components: [Component; 3]) -> TripleOrder {
        let wanted = components.map(|c| c as u8);
        LAYOUTS
            .iter()
            .position(|layout| *layout == wanted)
            .map_or(TripleOrder::Unknown, |i| TripleOrder::ALL[i])
    }

    /// Lays a triple out as `(x, y, z)` for this order.
    pub fn to_layout(self, triple: &TripleId) -> [u64; 3] {
        let spo = triple.to_array();
        LAYOUTS[self.layout_index()].map(|c| spo[c as usize])
    }

    /// Inverse of [`to_layout`](Self::to_layout).
    pub fn from_layout(self, xyz: [u64; 3]) -> TripleId {
        let mut spo = [0u64; 3];
        for (slot, &c) in LAYOUTS[self.layout_index()].iter().enumerate() {
            spo[c as usize] = xyz[slot];
        }
        TripleId::from_array(spo)
    }

    fn layout_index(self) -> usize {
        match self {
            TripleOrder::Unknown => 0,
            other => other as usize - 1,
        }
    }
}

impl std::fmt::Display for TripleOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TripleOrder {
    type Err = hdt_common::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TripleOrder::ALL
            .into_iter()
            .find(|o| o.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| hdt_common::error::Error::invalid_arg("order", s))
    }
}

/// Exchange of two layout slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
    /// First and second slot.
    SubjectPredicate,
    /// Second and third slot.
    PredicateObject,
    /// First and third slot.
    SubjectObject,
}

impl Swap {
    const ALL: [Swap; 3] = [
        Swap::SubjectPredicate,
        Swap::PredicateObject,
        Swap::SubjectObject,
    ];

    #[inline]
    pub const fn apply<T: Copy>(self, slots: [T; 3]) -> [T; 3] {
        let [a, b, c] = slots;
        match self {
            Swap::SubjectPredicate => [b, a, c],
            Swap::PredicateObject => [a, c, b],
            Swap::SubjectObject => [c, b, a],
        }
    }
}

/// Up to three swaps, applied in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSequence {
    swaps: [Swap; 3],
    len: u8,
}

impl SwapSequence {
    const EMPTY: SwapSequence = SwapSequence {
        swaps: [Swap::SubjectPredicate; 3],
        len: 0,
    };

    pub fn swaps(&self) -> &[Swap] {
        &self.swaps[..self.len as usize]
    }

    #[inline]
    pub fn apply(&self, mut xyz: [u64; 3]) -> [u64; 3] {
        for swap in self.swaps() {
            xyz = swap.apply(xyz);
        }
        xyz
    }
}

const fn same(a: [u8; 3], b: [u8; 3]) -> bool {
    a[0] == b[0] && a[1] == b[1] && a[2] == b[2]
}

/// Shortest swap sequence turning layout `from` into layout `to`.
const fn find_swaps(from: [u8; 3], to: [u8; 3]) -> SwapSequence {
    if same(from, to) {
        return SwapSequence::EMPTY;
    }
    let mut i = 0;
    while i < 3 {
        let one = Swap::ALL[i].apply(from);
        if same(one, to) {
            return SwapSequence {
                swaps: [Swap::ALL[i], Swap::SubjectPredicate, Swap::SubjectPredicate],
                len: 1,
            };
        }
        i += 1;
    }
    let mut i = 0;
    while i < 3 {
        let mut j = 0;
        while j < 3 {
            let two = Swap::ALL[j].apply(Swap::ALL[i].apply(from));
            if same(two, to) {
                return SwapSequence {
                    swaps: [Swap::ALL[i], Swap::ALL[j], Swap::SubjectPredicate],
                    len: 2,
                };
            }
            j += 1;
        }
        i += 1;
    }
    let mut i = 0;
    while i < 3 {
        let mut j = 0;
        while j < 3 {
            let mut k = 0;
            while k < 3 {
                let three = Swap::ALL[k].apply(Swap::ALL[j].apply(Swap::ALL[i].apply(from)));
                if same(three, to) {
                    return SwapSequence {
                        swaps: [Swap::ALL[i], Swap::ALL[j], Swap::ALL[k]],
                        len: 3,
                    };
                }
                k += 1;
            }
            j += 1;
        }
        i += 1;
    }
    panic!("layouts are not permutations of each other")
}

const fn build_swap_table() -> [[SwapSequence; 6]; 6] {
    let mut table = [[SwapSequence::EMPTY; 6]; 6];
    let mut from = 0;
    while from < 6 {
        let mut to = 0;
        while to < 6 {
            table[from][to] = find_swaps(LAYOUTS[from], LAYOUTS[to]);
            to += 1;
        }
        from += 1;
    }
    table
}

static SWAP_TABLE: [[SwapSequence; 6]; 6] = build_swap_table();

/// Swap sequence converting a layout in `from` to a layout in `to`.
pub fn swap_sequence(from: TripleOrder, to: TripleOrder) -> &'static SwapSequence {
    &SWAP_TABLE[from.layout_index()][to.layout_index()]
}

/// Converts an `(x, y, z)` layout in `from` into the layout of the same
/// triple in `to`.
#[inline]
pub fn convert(from: TripleOrder, to: TripleOrder, xyz: [u64; 3]) -> [u64; 3] {
    swap_sequence(from, to).apply(xyz)
}

/// A set of acceptable result orders. The empty set accepts any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSet(u8);

impl OrderSet {
    pub const ANY: OrderSet = OrderSet(0);

    pub fn single(order: TripleOrder) -> OrderSet {
        OrderSet::ANY.with(order)
    }

    pub fn of(orders: &[TripleOrder]) -> OrderSet {
        orders.iter().fold(OrderSet::ANY, |set, &o| set.with(o))
    }

    pub fn with(self, order: TripleOrder) -> OrderSet {
        match order {
            TripleOrder::Unknown => self,
            o => OrderSet(self.0 | (1 << o.ordinal())),
        }
    }

    pub fn is_any(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, order: TripleOrder) -> bool {
        self.is_any() || (order != TripleOrder::Unknown && self.0 & (1 << order.ordinal()) != 0)
    }

    /// Known orders accepted by this set.
    pub fn iter(self) -> impl Iterator<Item = TripleOrder> {
        TripleOrder::ALL.into_iter().filter(move |&o| self.contains(o))
    }
}
