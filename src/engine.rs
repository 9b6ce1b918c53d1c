use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::board::position::Move;
use crate::search::transposition::TranspositionTable;

/// `Hash` option bounds, in mebibytes.
pub const HASH_MB_MIN: usize = 1;
pub const HASH_MB_MAX: usize = 32768;
pub const HASH_MB_DEFAULT: usize = 1;

/// The transposition table lives for the process. Only one search runs at
/// a time, so the lock is uncontended; the search holds it for the whole
/// invocation and the option handlers take it between searches.
static TT: Lazy<Mutex<TranspositionTable>> =
    Lazy::new(|| Mutex::new(TranspositionTable::new(HASH_MB_DEFAULT)));

pub(crate) fn lock_tt() -> MutexGuard<'static, TranspositionTable> {
    TT.lock().expect("transposition table lock poisoned")
}

/// Tests that exercise a whole search share the process-wide table above;
/// serialising them keeps their timing assertions meaningful.
#[cfg(test)]
pub(crate) static TEST_SERIAL: Mutex<()> = Mutex::new(());

#[cfg(test)]
pub(crate) fn test_serial() -> MutexGuard<'static, ()> {
    TEST_SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handler for `setoption name Hash`.
pub fn set_hash_size(size_mb: usize) {
    let size_mb = size_mb.clamp(HASH_MB_MIN, HASH_MB_MAX);
    lock_tt().resize(size_mb);
}

/// Handler for the `Clear Hash` button.
pub fn clear_hash() {
    lock_tt().clear();
}

/// Validity bits for the fields of [`Info`]. `MATE` and `CP` are mutually
/// exclusive; `LOWER_BOUND` only accompanies one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfoFlags(pub u16);

impl InfoFlags {
    pub const DEPTH: InfoFlags = InfoFlags(0x1);
    pub const NODES: InfoFlags = InfoFlags(0x1 << 1);
    pub const NPS: InfoFlags = InfoFlags(0x1 << 2);
    pub const MATE: InfoFlags = InfoFlags(0x1 << 3);
    pub const TIME: InfoFlags = InfoFlags(0x1 << 4);
    pub const CP: InfoFlags = InfoFlags(0x1 << 5);
    pub const LOWER_BOUND: InfoFlags = InfoFlags(0x1 << 6);

    pub const fn empty() -> InfoFlags {
        InfoFlags(0)
    }

    #[inline(always)]
    pub const fn contains(self, other: InfoFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for InfoFlags {
    type Output = InfoFlags;

    fn bitor(self, rhs: InfoFlags) -> InfoFlags {
        InfoFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for InfoFlags {
    fn bitor_assign(&mut self, rhs: InfoFlags) {
        self.0 |= rhs.0;
    }
}

/// One progress report, sent between depth iterations. Only the fields
/// whose flag is set carry meaning.
#[derive(Debug, Clone, Copy, Default)]
pub struct Info {
    pub flags: InfoFlags,
    pub depth: i32,
    pub cp: i32,
    /// Full moves to mate; negative when the side to move is being mated.
    pub mate: i32,
    pub nodes: u64,
    pub nps: u64,
    pub time: u64,
}

pub type InfoSender = Box<dyn FnMut(&Info) + Send>;
pub type BestMoveSender = Box<dyn FnMut(Move) + Send>;

/// Everything one `go` needs. The I/O adapter builds this, spawns the
/// worker, and may flip `stop` at any time; the worker sets `stop` itself
/// right before it exits so the adapter can observe completion.
pub struct SearchRequest {
    pub fen: String,
    /// LAN moves replayed from `fen` to reach the true root. Their
    /// positions stay visible to the repetition check.
    pub moves: Vec<String>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    /// Remaining clock per color, milliseconds, `[white, black]`.
    pub time: [Option<u64>; 2],
    /// Increment per color, milliseconds. Accepted from the protocol but
    /// not part of the allocation formula.
    pub increment: [u64; 2],
    /// Moves to the next time control; 0 when unknown.
    pub movestogo: u32,
    pub movetime: Option<u64>,
    /// Stop early once a mate at most this many moves deep is proven.
    pub mate: Option<i32>,
    pub info_sender: InfoSender,
    pub best_move_sender: BestMoveSender,
    pub stop: Arc<AtomicBool>,
}

impl SearchRequest {
    pub fn new(
        fen: impl Into<String>,
        info_sender: InfoSender,
        best_move_sender: BestMoveSender,
    ) -> SearchRequest {
        SearchRequest {
            fen: fen.into(),
            moves: Vec::new(),
            depth: None,
            nodes: None,
            time: [None, None],
            increment: [0, 0],
            movestogo: 0,
            movetime: None,
            mate: None,
            info_sender,
            best_move_sender,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_compose() {
        let mut flags = InfoFlags::DEPTH | InfoFlags::NODES;
        flags |= InfoFlags::CP;
        assert!(flags.contains(InfoFlags::DEPTH));
        assert!(flags.contains(InfoFlags::CP));
        assert!(!flags.contains(InfoFlags::MATE));
        assert!(flags.contains(InfoFlags::DEPTH | InfoFlags::NODES));
    }

    #[test]
    fn hash_option_clamps_to_bounds() {
        let _serial = test_serial();
        set_hash_size(0);
        let small = lock_tt().capacity();
        set_hash_size(2);
        assert!(lock_tt().capacity() > small);
        set_hash_size(1);
        assert_eq!(lock_tt().capacity(), small);
    }
}
