use crate::board::position::Move;
use crate::search::MATE_BOUND;

const BYTES_PER_MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    Lower = 0,
    Upper = 1,
    Exact = 2,
}

#[derive(Debug, Clone, Copy)]
pub struct NodeData {
    pub score: i16,
    pub depth: u8,
    pub bound: Bound,
    pub best_move: Move,
    pub hash: u64,
}

impl NodeData {
    const fn empty() -> NodeData {
        NodeData {
            score: 0,
            depth: 0,
            bound: Bound::Lower,
            best_move: Move::NULL,
            hash: 0,
        }
    }
}

/// Open-addressing table with a prime capacity (the prime modulus spreads
/// the hash bits over the slots) and an always-replace store. A probe only
/// returns a slot whose stored full hash matches, so index collisions are
/// harmless.
pub struct TranspositionTable {
    entries: Box<[NodeData]>,
    capacity: usize,
}

impl TranspositionTable {
    /// Largest table that fits in `size_mb` mebibytes.
    pub fn new(size_mb: usize) -> TranspositionTable {
        let capacity = Self::capacity_for(size_mb);
        TranspositionTable {
            entries: vec![NodeData::empty(); capacity].into_boxed_slice(),
            capacity,
        }
    }

    fn capacity_for(size_mb: usize) -> usize {
        let max_entries = size_mb * BYTES_PER_MIB / std::mem::size_of::<NodeData>();
        find_prime(max_entries.max(2))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn probe(&self, hash: u64) -> Option<NodeData> {
        let slot = (hash % self.capacity as u64) as usize;
        let entry = self.entries[slot];
        if entry.hash == hash {
            Some(entry)
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn store(&mut self, data: NodeData) {
        let slot = (data.hash % self.capacity as u64) as usize;
        self.entries[slot] = data;
    }

    #[inline(always)]
    pub fn prefetch(&self, hash: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            let slot = (hash % self.capacity as u64) as usize;
            std::arch::x86_64::_mm_prefetch(
                self.entries.as_ptr().add(slot) as *const i8,
                std::arch::x86_64::_MM_HINT_T0,
            );
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = hash;
    }

    pub fn clear(&mut self) {
        self.entries.fill(NodeData::empty());
    }

    /// Reallocates to the new budget. Entries that land on the same slot
    /// under the new modulus survive; everything else reads as empty thanks
    /// to the full-hash check.
    pub fn resize(&mut self, size_mb: usize) {
        let new_capacity = Self::capacity_for(size_mb);
        if new_capacity == self.capacity {
            return;
        }
        let mut entries = vec![NodeData::empty(); new_capacity];
        let shared = self.capacity.min(new_capacity);
        entries[..shared].copy_from_slice(&self.entries[..shared]);
        self.entries = entries.into_boxed_slice();
        self.capacity = new_capacity;
    }
}

/// Mate scores are stored relative to the storing node, not the root:
/// add the ply on the way in, subtract it on the way out. Without this a
/// transposition reached at a different ply would report a mate distance
/// measured from the wrong place.
#[inline(always)]
pub fn score_to_tt(score: i32, ply: i32) -> i32 {
    if score >= MATE_BOUND {
        score + ply
    } else if score <= -MATE_BOUND {
        score - ply
    } else {
        score
    }
}

#[inline(always)]
pub fn score_from_tt(score: i32, ply: i32) -> i32 {
    if score >= MATE_BOUND {
        score - ply
    } else if score <= -MATE_BOUND {
        score + ply
    } else {
        score
    }
}

fn find_prime(n: usize) -> usize {
    for candidate in (2..=n).rev() {
        if is_prime(candidate) {
            return candidate;
        }
    }
    2
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut divisor = 3;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::INF;

    #[test]
    fn capacity_is_prime_and_within_budget() {
        let tt = TranspositionTable::new(1);
        assert!(is_prime(tt.capacity()));
        assert!(tt.capacity() * std::mem::size_of::<NodeData>() <= BYTES_PER_MIB);
        // The next prime above the capacity must overshoot the budget.
        let limit = BYTES_PER_MIB / std::mem::size_of::<NodeData>();
        assert!(tt.capacity() <= limit);
        assert!((tt.capacity() + 1..=limit).all(|n| !is_prime(n)));
    }

    #[test]
    fn store_then_probe() {
        let mut tt = TranspositionTable::new(1);
        let data = NodeData {
            score: 137,
            depth: 9,
            bound: Bound::Exact,
            best_move: Move(0x1234),
            hash: 0xDEAD_BEEF_0102_0304,
        };
        tt.store(data);
        let found = tt.probe(data.hash).unwrap();
        assert_eq!(found.score, 137);
        assert_eq!(found.depth, 9);
        assert_eq!(found.bound, Bound::Exact);
        assert_eq!(found.best_move, Move(0x1234));
        assert!(tt.probe(0x1111).is_none());
    }

    #[test]
    fn always_replace() {
        let mut tt = TranspositionTable::new(1);
        let hash = 42 + tt.capacity() as u64; // same slot as hash 42
        tt.store(NodeData { score: 1, depth: 1, bound: Bound::Lower, best_move: Move::NULL, hash: 42 });
        tt.store(NodeData { score: 2, depth: 1, bound: Bound::Lower, best_move: Move::NULL, hash });
        assert!(tt.probe(42).is_none(), "older entry evicted");
        assert_eq!(tt.probe(hash).unwrap().score, 2);
    }

    #[test]
    fn clear_empties_the_table() {
        let mut tt = TranspositionTable::new(1);
        tt.store(NodeData { score: 5, depth: 3, bound: Bound::Upper, best_move: Move::NULL, hash: 99 });
        tt.clear();
        assert!(tt.probe(99).is_none());
    }

    #[test]
    fn resize_changes_capacity() {
        let mut tt = TranspositionTable::new(1);
        let small = tt.capacity();
        tt.resize(2);
        assert!(tt.capacity() > small);
        tt.resize(1);
        assert_eq!(tt.capacity(), small);
    }

    #[test]
    fn mate_scores_shift_by_ply() {
        let mate_in_3 = INF - 3;
        let stored = score_to_tt(mate_in_3, 5);
        assert_eq!(stored, INF - 3 + 5);
        assert_eq!(score_from_tt(stored, 7), INF - 3 + 5 - 7);
        // Ordinary scores pass through untouched.
        assert_eq!(score_to_tt(120, 9), 120);
        assert_eq!(score_from_tt(-120, 9), -120);
        // Mated scores mirror.
        assert_eq!(score_from_tt(score_to_tt(-(INF - 4), 6), 6), -(INF - 4));
    }
}
