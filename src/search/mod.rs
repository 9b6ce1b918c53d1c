pub mod alphabeta;
pub mod history;
pub mod movepick;
pub mod time_management;
pub mod transposition;

/// Score infinity; mate scores count down from here by the distance in
/// plies, so a mate delivered in `n` plies is `INF - n`.
pub const INF: i32 = 32000;

/// Maximum search depth and ply, bounding every per-ply table.
pub const MAX_DEPTH: i32 = 256;
pub const MAX_PLY: i32 = MAX_DEPTH;

/// Anything at or beyond this magnitude encodes a mate distance.
pub const MATE_BOUND: i32 = INF - MAX_PLY;

pub use alphabeta::search;
