pub mod board {
    pub mod position;
    pub mod bitboard;
    pub mod zobrist;
}

pub mod eval {
    pub mod material;
    pub mod pst;
    pub mod pawns;
    pub mod evaluate;
    pub mod see;
}

pub mod movegen;
pub mod search;

pub mod engine;
pub mod error;
pub mod rng;

/// Forces the process-wide attack and hash tables. They are lazily built on
/// first use anyway; calling this up front keeps the cost out of the first
/// search.
pub fn init() {
    board::zobrist::init_zobrist();
    movegen::magic::init_magics();
}
