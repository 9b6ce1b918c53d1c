use crate::board::bitboard::{lsb_index, square_bb, Bitboard};
use crate::board::position::{Color, Move, MoveKind, PieceType, Position};
use crate::eval::material::piece_value;
use crate::movegen::attackers_of;

/// Static exchange evaluation: true iff the side to move comes out of the
/// capture sequence started by `m` strictly more than `threshold`
/// centipawns ahead, assuming both sides always recapture with their least
/// valuable attacker and may stop when recapturing loses material.
///
/// The attacker set is the direct-attacker set of the destination square;
/// a slider revealed behind a used attacker does not join the exchange. A
/// king may only recapture when the opponent has no attacker left.
pub fn wins_exchange(pos: &Position, m: Move, threshold: i32) -> bool {
    let from = m.from();
    let to = m.to();
    let us = pos.side_to_move();

    let mut gains = [0i32; 34];
    gains[0] = if m.kind() == MoveKind::EpCapture {
        piece_value(PieceType::Pawn)
    } else {
        let victim = pos.piece_at(to);
        if victim.is_none() {
            0
        } else {
            piece_value(victim.piece_type())
        }
    };

    let mut occ = pos.occupancy() & !square_bb(from);
    if m.kind() == MoveKind::EpCapture {
        let victim_square = if us == Color::White { to - 8 } else { to + 8 };
        occ &= !square_bb(victim_square);
    }

    let mut attackers = attackers_of(pos, to, occ) & occ;
    let mut on_square_value = piece_value(pos.piece_at(from).piece_type());
    let mut side = us.opposite();
    let mut depth = 0usize;

    loop {
        let side_attackers = attackers & pos.color_pieces(side);
        if side_attackers == 0 {
            break;
        }
        let (attacker_square, attacker_type) = least_valuable(pos, side, side_attackers);
        if attacker_type == PieceType::King
            && attackers & pos.color_pieces(side.opposite()) != 0
        {
            // The king cannot walk into the remaining attackers, so the
            // previous capture stands.
            break;
        }

        depth += 1;
        gains[depth] = on_square_value - gains[depth - 1];
        on_square_value = piece_value(attacker_type);
        occ &= !square_bb(attacker_square);
        attackers &= occ;
        side = side.opposite();
    }

    while depth > 0 {
        gains[depth - 1] = -std::cmp::max(-gains[depth - 1], gains[depth]);
        depth -= 1;
    }
    gains[0] > threshold
}

#[inline(always)]
fn least_valuable(pos: &Position, side: Color, attackers: Bitboard) -> (u8, PieceType) {
    for piece_type in PieceType::ALL {
        let subset = attackers & pos.pieces_of(piece_type, side);
        if subset != 0 {
            return (lsb_index(subset), piece_type);
        }
    }
    unreachable!("attackers bitboard was non-empty");
}
