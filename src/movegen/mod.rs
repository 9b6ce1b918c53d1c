pub mod magic;
pub mod moves;

pub use moves::{
    attackers_of, generate, is_in_check, is_legal, is_square_attacked, lan_to_move, perft, GenType,
    MoveList, ScoredMove, MAX_MOVES,
};
