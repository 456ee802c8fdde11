//! 256-bit interval arithmetic over the trie keyspace. Every
//! other component — the inspector, the pivot, the healer, swap-in — either
//! checks out work from a `NodeTagRangeSet` or reports progress back into
//! one.

use std::collections::BTreeMap;

use ethereum_types::{H256, U256};

/// A closed interval `[start, end]` of NodeTags, `start <= end`.
///
/// A range popped from a `NodeTagRangeSet` via `check_out_range`/`fetch` is a
/// lease: it must be consumed (`mark_processed`) or returned
/// (`return_range`) on every exit path, so dropping one silently is always a
/// bug — `#[must_use]` makes the compiler flag the call sites that forget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[must_use]
pub struct NodeTagRange {
    pub start: H256,
    pub end: H256,
}

impl NodeTagRange {
    pub fn new(start: H256, end: H256) -> Self {
        debug_assert!(start <= end, "NodeTagRange requires start <= end");
        Self { start, end }
    }

    pub fn full() -> Self {
        Self { start: H256::zero(), end: H256::repeat_byte(0xff) }
    }

    /// `max - min + 1`, saturating at `2^256` (represented as `U256::MAX`,
    /// one short of the true value since `U256` cannot hold `2^256` itself —
    /// this is the saturating convention used throughout).
    pub fn len(&self) -> U256 {
        let start = u256(self.start);
        let end = u256(self.end);
        if start.is_zero() && end == U256::MAX {
            U256::MAX
        } else {
            end - start + 1
        }
    }

    pub fn contains(&self, pt: H256) -> bool {
        self.start <= pt && pt <= self.end
    }

    pub fn overlaps(&self, other: &NodeTagRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True if the two ranges overlap or sit immediately next to each other
    /// (no NodeTag between them), the condition under which `merge` fuses
    /// them into one stored interval.
    fn touches(&self, other: &NodeTagRange) -> bool {
        self.overlaps(other) || inc(self.end) == Some(other.start) || inc(other.end) == Some(self.start)
    }

    pub fn intersection(&self, other: &NodeTagRange) -> Option<NodeTagRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then(|| NodeTagRange::new(start, end))
    }
}

fn u256(h: H256) -> U256 {
    U256::from_big_endian(h.as_bytes())
}

fn h256(u: U256) -> H256 {
    let mut bytes = [0u8; 32];
    u.to_big_endian(&mut bytes);
    H256(bytes)
}

pub(crate) fn inc(h: H256) -> Option<H256> {
    (h != H256::repeat_byte(0xff)).then(|| h256(u256(h) + 1))
}

fn dec(h: H256) -> Option<H256> {
    (h != H256::zero()).then(|| h256(u256(h) - 1))
}

/// A set of disjoint, non-adjacent `NodeTagRange`s in ascending order,
/// keyed by each interval's start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeTagRangeSet {
    intervals: BTreeMap<H256, H256>,
}

impl NodeTagRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        let mut set = Self::new();
        set.merge(NodeTagRange::full());
        set
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeTagRange> + '_ {
        self.intervals.iter().map(|(&start, &end)| NodeTagRange::new(start, end))
    }

    /// Total bytes covered by the set, saturating like `NodeTagRange::len`.
    pub fn total(&self) -> U256 {
        let mut total = U256::zero();
        for iv in self.iter() {
            total = if total == U256::MAX { total } else { total.saturating_add(iv.len()) };
        }
        total
    }

    /// Coverage of `[0, 2^256)`, in `[0.0, 1.0]`.
    pub fn full_factor(&self) -> f64 {
        let total = self.total();
        if total == U256::MAX {
            1.0
        } else {
            let total_f: f64 = total.to_string().parse().unwrap_or(f64::MAX);
            let whole_f = 2f64.powi(256);
            (total_f / whole_f).min(1.0)
        }
    }

    pub fn is_full(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals.get(&H256::zero()) == Some(&H256::repeat_byte(0xff))
    }

    /// Merges `iv` into the set, coalescing overlapping/adjacent intervals.
    /// Returns the number of previously-uncovered bytes `iv` added.
    pub fn merge(&mut self, iv: NodeTagRange) -> U256 {
        let already = self.covered(&iv);
        let mut start = iv.start;
        let mut end = iv.end;

        let touching: Vec<H256> = self
            .intervals
            .iter()
            .filter(|(&s, &e)| NodeTagRange::new(s, e).touches(&NodeTagRange::new(start, end)))
            .map(|(&s, _)| s)
            .collect();

        for key in touching {
            if let Some(existing_end) = self.intervals.remove(&key) {
                start = start.min(key);
                end = end.max(existing_end);
            }
        }

        self.intervals.insert(start, end);
        iv.len() - already
    }

    /// Removes `iv` from the set (splitting stored intervals as needed).
    /// Returns the number of bytes actually removed.
    pub fn reduce(&mut self, iv: NodeTagRange) -> U256 {
        let overlapping: Vec<(H256, H256)> = self
            .intervals
            .iter()
            .filter(|(&s, &e)| NodeTagRange::new(s, e).overlaps(&iv))
            .map(|(&s, &e)| (s, e))
            .collect();

        let mut removed = U256::zero();
        for (s, e) in overlapping {
            self.intervals.remove(&s);
            let existing = NodeTagRange::new(s, e);
            let Some(cut) = existing.intersection(&iv) else { continue };
            removed += cut.len();

            if s < cut.start {
                if let Some(left_end) = dec(cut.start) {
                    self.intervals.insert(s, left_end);
                }
            }
            if cut.end < e {
                if let Some(right_start) = inc(cut.end) {
                    self.intervals.insert(right_start, e);
                }
            }
        }
        removed
    }

    /// Bytes of `iv` already present in the set.
    pub fn covered(&self, iv: &NodeTagRange) -> U256 {
        self.intervals
            .iter()
            .filter_map(|(&s, &e)| NodeTagRange::new(s, e).intersection(iv))
            .fold(U256::zero(), |acc, cut| acc + cut.len())
    }

    /// First stored interval whose end is `>= pt`.
    pub fn ge(&self, pt: H256) -> Option<NodeTagRange> {
        self.iter().find(|iv| iv.end >= pt)
    }

    /// First stored interval whose end is strictly `> pt`.
    pub fn gt(&self, pt: H256) -> Option<NodeTagRange> {
        self.iter().find(|iv| iv.end > pt)
    }

    /// Pops a prefix of size `<= max_len` from the first stored interval,
    /// splitting it if it's larger. Returns `None` if the set is empty.
    /// This is the primitive `checkOutRange` is built on: the popped
    /// range leaves the set (caller becomes responsible for it) and must be
    /// re-merged or marked processed, never dropped.
    pub fn fetch(&mut self, max_len: U256) -> Option<NodeTagRange> {
        let (&start, &end) = self.intervals.iter().next()?;
        self.intervals.remove(&start);

        let full = NodeTagRange::new(start, end);
        if full.len() <= max_len {
            return Some(full);
        }

        let checkout_end = h256(u256(start) + max_len - 1);
        if let Some(remainder_start) = inc(checkout_end) {
            self.intervals.insert(remainder_start, end);
        }
        Some(NodeTagRange::new(start, checkout_end))
    }
}
