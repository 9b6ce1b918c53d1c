use once_cell::sync::Lazy;

use crate::rng::Rng;

/// The Zobrist table is 781 keys: one per (piece, square) pair, one per
/// castling-right bit, one per en-passant file and one for the side to
/// move. The generator seed is fixed so the table is identical in every
/// build, which keeps transposition-table entries portable between runs.
const ZOBRIST_SEED: u64 = 0x9E1A_2B3C_4D5E_6F70;

pub struct ZobristKeys {
    pub pieces: [[u64; 64]; 12],
    pub castling: [u64; 4],
    pub en_passant: [u64; 8],
    pub side_to_move: u64,
}

pub static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(|| {
    let mut rng = Rng::new(ZOBRIST_SEED);
    let mut keys = ZobristKeys {
        pieces: [[0; 64]; 12],
        castling: [0; 4],
        en_passant: [0; 8],
        side_to_move: 0,
    };
    for piece in 0..12 {
        for square in 0..64 {
            keys.pieces[piece][square] = rng.next();
        }
    }
    for right in keys.castling.iter_mut() {
        *right = rng.next();
    }
    for file in keys.en_passant.iter_mut() {
        *file = rng.next();
    }
    keys.side_to_move = rng.next();
    keys
});

pub fn init_zobrist() {
    Lazy::force(&ZOBRIST);
}

#[inline(always)]
pub fn piece_key(piece: u8, square: u8) -> u64 {
    ZOBRIST.pieces[piece as usize][square as usize]
}

#[inline(always)]
pub fn side_key() -> u64 {
    ZOBRIST.side_to_move
}

#[inline(always)]
pub fn en_passant_key(file: u8) -> u64 {
    ZOBRIST.en_passant[file as usize]
}

/// XOR of the keys for every set bit in the castling-rights nibble.
#[inline(always)]
pub fn castling_key(rights: u8) -> u64 {
    let mut key = 0;
    let mut bits = rights & 0xf;
    while bits != 0 {
        let bit = bits.trailing_zeros() as usize;
        key ^= ZOBRIST.castling[bit];
        bits &= bits - 1;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_nonzero_and_distinct() {
        let mut seen = std::collections::HashSet::new();
        for piece in 0..12u8 {
            for square in 0..64u8 {
                let key = piece_key(piece, square);
                assert_ne!(key, 0);
                assert!(seen.insert(key));
            }
        }
        for right in 0..4 {
            assert!(seen.insert(ZOBRIST.castling[right]));
        }
        for file in 0..8u8 {
            assert!(seen.insert(en_passant_key(file)));
        }
        assert!(seen.insert(side_key()));
        assert_eq!(seen.len(), 781);
    }

    #[test]
    fn castling_key_composes_per_bit() {
        assert_eq!(castling_key(0), 0);
        assert_eq!(castling_key(0b0011), ZOBRIST.castling[0] ^ ZOBRIST.castling[1]);
        assert_eq!(
            castling_key(0b1111),
            ZOBRIST.castling[0] ^ ZOBRIST.castling[1] ^ ZOBRIST.castling[2] ^ ZOBRIST.castling[3]
        );
    }
}
