use crate::board::bitboard::popcount;
use crate::board::position::{PieceType, Position};

/// Intrinsic piece values on the centipawn scale.
pub const PIECE_VALUES: [i32; 6] = [100, 325, 350, 500, 1000, 10000];

#[inline(always)]
pub fn piece_value(piece_type: PieceType) -> i32 {
    PIECE_VALUES[piece_type as usize]
}

/// Material difference from the side to move's point of view, kings
/// excluded. Kept as the regression baseline for the tapered evaluator.
pub fn material_balance(pos: &Position) -> i32 {
    let us = pos.side_to_move();
    let them = us.opposite();
    let mut score = 0;
    for piece_type in [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
    ] {
        let ours = popcount(pos.pieces_of(piece_type, us)) as i32;
        let theirs = popcount(pos.pieces_of(piece_type, them)) as i32;
        score += piece_value(piece_type) * (ours - theirs);
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_is_balanced() {
        assert_eq!(material_balance(&Position::startpos()), 0);
    }

    #[test]
    fn balance_follows_side_to_move() {
        let white_up = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1").unwrap();
        assert_eq!(material_balance(&white_up), 1000);
        let black_view = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 b - - 0 1").unwrap();
        assert_eq!(material_balance(&black_view), -1000);
    }
}
