use crate::board::bitboard::{
    self, file_of, popcount, rank_of, square_at, square_bb, Bitboard, EMPTY,
};
use crate::board::zobrist::{castling_key, en_passant_key, piece_key, side_key};
use crate::error::EngineError;

pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Castling-right bits: `1 << side << 2 * color` with queen side = 0 and
/// king side = 1.
pub const CASTLE_WQ: u8 = 0b0001;
pub const CASTLE_WK: u8 = 0b0010;
pub const CASTLE_BQ: u8 = 0b0100;
pub const CASTLE_BK: u8 = 0b1000;

const EP_PRESENT: u8 = 0x8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    #[inline(always)]
    pub const fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PieceType {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl PieceType {
    pub const ALL: [PieceType; 6] = [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ];
}

/// A piece packs its type and color as `type * 2 + color`, with 0xff
/// reserved for empty squares in the square-centric board array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece(pub u8);

impl Piece {
    pub const NONE: Piece = Piece(0xff);

    #[inline(always)]
    pub const fn new(piece_type: PieceType, color: Color) -> Piece {
        Piece((piece_type as u8) << 1 | color as u8)
    }

    #[inline(always)]
    pub const fn is_none(self) -> bool {
        self.0 == Piece::NONE.0
    }

    #[inline(always)]
    pub fn piece_type(self) -> PieceType {
        debug_assert!(!self.is_none());
        match self.0 >> 1 {
            0 => PieceType::Pawn,
            1 => PieceType::Knight,
            2 => PieceType::Bishop,
            3 => PieceType::Rook,
            4 => PieceType::Queen,
            _ => PieceType::King,
        }
    }

    #[inline(always)]
    pub fn color(self) -> Color {
        debug_assert!(!self.is_none());
        if self.0 & 1 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    /// Index into the 12-entry Zobrist piece table.
    #[inline(always)]
    pub const fn index(self) -> u8 {
        self.0
    }

    fn from_fen_char(ch: char) -> Option<Piece> {
        let piece_type = match ch.to_ascii_lowercase() {
            'p' => PieceType::Pawn,
            'n' => PieceType::Knight,
            'b' => PieceType::Bishop,
            'r' => PieceType::Rook,
            'q' => PieceType::Queen,
            'k' => PieceType::King,
            _ => return None,
        };
        let color = if ch.is_ascii_uppercase() { Color::White } else { Color::Black };
        Some(Piece::new(piece_type, color))
    }

    fn to_fen_char(self) -> char {
        let ch = match self.piece_type() {
            PieceType::Pawn => 'p',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Rook => 'r',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        };
        match self.color() {
            Color::White => ch.to_ascii_uppercase(),
            Color::Black => ch,
        }
    }
}

/// Move kinds occupy the high nibble of the 16-bit move word. En-passant
/// targets name the square the capturing pawn lands on; castling targets
/// name the king's destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoveKind {
    Quiet = 0,
    DoublePawnPush = 1,
    KingCastle = 2,
    QueenCastle = 3,
    Capture = 4,
    EpCapture = 5,
    KnightPromotion = 6,
    RookPromotion = 7,
    BishopPromotion = 8,
    QueenPromotion = 9,
    KnightPromotionCapture = 10,
    RookPromotionCapture = 11,
    BishopPromotionCapture = 12,
    QueenPromotionCapture = 13,
}

impl MoveKind {
    #[inline(always)]
    fn from_bits(bits: u16) -> MoveKind {
        match bits {
            0 => MoveKind::Quiet,
            1 => MoveKind::DoublePawnPush,
            2 => MoveKind::KingCastle,
            3 => MoveKind::QueenCastle,
            4 => MoveKind::Capture,
            5 => MoveKind::EpCapture,
            6 => MoveKind::KnightPromotion,
            7 => MoveKind::RookPromotion,
            8 => MoveKind::BishopPromotion,
            9 => MoveKind::QueenPromotion,
            10 => MoveKind::KnightPromotionCapture,
            11 => MoveKind::RookPromotionCapture,
            12 => MoveKind::BishopPromotionCapture,
            _ => MoveKind::QueenPromotionCapture,
        }
    }
}

/// 16-bit move: from (6) | to (6) | kind (4). The all-zero word doubles as
/// the null move, which is fine because a quiet a1-a1 move cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move(pub u16);

impl Move {
    pub const NULL: Move = Move(0);

    #[inline(always)]
    pub const fn new(from: u8, to: u8, kind: MoveKind) -> Move {
        Move((kind as u16) << 12 | (to as u16 & 0x3f) << 6 | (from as u16 & 0x3f))
    }

    #[inline(always)]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn from(self) -> u8 {
        (self.0 & 0x3f) as u8
    }

    #[inline(always)]
    pub const fn to(self) -> u8 {
        (self.0 >> 6 & 0x3f) as u8
    }

    #[inline(always)]
    pub fn kind(self) -> MoveKind {
        MoveKind::from_bits(self.0 >> 12 & 0xf)
    }

    #[inline(always)]
    pub fn is_capture(self) -> bool {
        matches!(
            self.kind(),
            MoveKind::Capture
                | MoveKind::EpCapture
                | MoveKind::KnightPromotionCapture
                | MoveKind::RookPromotionCapture
                | MoveKind::BishopPromotionCapture
                | MoveKind::QueenPromotionCapture
        )
    }

    #[inline(always)]
    pub fn is_promotion(self) -> bool {
        self.0 >> 12 >= MoveKind::KnightPromotion as u16
    }

    #[inline(always)]
    pub fn is_castling(self) -> bool {
        matches!(self.kind(), MoveKind::KingCastle | MoveKind::QueenCastle)
    }

    #[inline(always)]
    pub fn is_quiet(self) -> bool {
        !self.is_capture() && !self.is_promotion()
    }

    pub fn promotion_piece_type(self) -> Option<PieceType> {
        match self.kind() {
            MoveKind::KnightPromotion | MoveKind::KnightPromotionCapture => Some(PieceType::Knight),
            MoveKind::RookPromotion | MoveKind::RookPromotionCapture => Some(PieceType::Rook),
            MoveKind::BishopPromotion | MoveKind::BishopPromotionCapture => Some(PieceType::Bishop),
            MoveKind::QueenPromotion | MoveKind::QueenPromotionCapture => Some(PieceType::Queen),
            _ => None,
        }
    }

    /// Long algebraic notation; the null move is the empty string.
    pub fn to_lan(self) -> String {
        if self.is_null() {
            return String::new();
        }
        let mut lan = String::with_capacity(5);
        lan.push_str(&bitboard::square_to_algebraic(self.from()));
        lan.push_str(&bitboard::square_to_algebraic(self.to()));
        if let Some(promo) = self.promotion_piece_type() {
            lan.push(match promo {
                PieceType::Knight => 'n',
                PieceType::Bishop => 'b',
                PieceType::Rook => 'r',
                _ => 'q',
            });
        }
        lan
    }
}

/// State that a move destroys rather than transforms: it is pushed wholesale
/// on make and popped on unmake. `key_part` carries the castling and
/// en-passant Zobrist contributions so the incremental hash never has to
/// reconstruct them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrrState {
    pub halfmove_clock: u16,
    pub castling: u8,
    /// En-passant file in the low 3 bits, bit 3 set when present.
    pub ep: u8,
    pub captured: Piece,
    pub key_part: u64,
}

impl IrrState {
    const fn empty() -> IrrState {
        IrrState {
            halfmove_clock: 0,
            castling: 0,
            ep: 0,
            captured: Piece::NONE,
            key_part: 0,
        }
    }
}

/// Piece placement is stored twice: piece-centric bitboards (two color
/// boards and six type boards) for generation, and a square-centric array
/// for O(1) lookup. The two representations are kept consistent by the
/// `place_piece` / `remove_piece` pair, which also maintain the reversible
/// Zobrist key.
#[derive(Debug, Clone)]
pub struct Position {
    color_bb: [Bitboard; 2],
    type_bb: [Bitboard; 6],
    board: [Piece; 64],
    side_to_move: Color,
    fullmove: u16,
    /// Piece placement and side-to-move contributions. The full hash is
    /// `key ^ states.last().key_part`.
    key: u64,
    states: Vec<IrrState>,
}

impl Position {
    pub fn startpos() -> Position {
        Position::from_fen(STARTPOS_FEN).expect("start position FEN is valid")
    }

    pub fn from_fen(fen: &str) -> Result<Position, EngineError> {
        let fields: Vec<&str> = fen.split(' ').filter(|f| !f.is_empty()).collect();
        if fields.len() != 6 {
            return Err(EngineError::InvalidFen { field: fields.len(), reason: "expected six fields" });
        }

        let mut states = Vec::with_capacity(256);
        states.push(IrrState::empty());
        let mut pos = Position {
            color_bb: [EMPTY; 2],
            type_bb: [EMPTY; 6],
            board: [Piece::NONE; 64],
            side_to_move: Color::White,
            fullmove: 1,
            key: 0,
            states,
        };

        pos.parse_placement(fields[0])?;
        pos.parse_side(fields[1])?;
        pos.parse_castling(fields[2])?;
        pos.parse_en_passant(fields[3])?;

        let clock: u16 = fields[4]
            .parse()
            .map_err(|_| EngineError::InvalidFen { field: 4, reason: "bad halfmove clock" })?;
        pos.states[0].halfmove_clock = clock;
        pos.fullmove = fields[5]
            .parse()
            .map_err(|_| EngineError::InvalidFen { field: 5, reason: "bad fullmove counter" })?;

        if pos.side_to_move == Color::Black {
            pos.key ^= side_key();
        }
        Ok(pos)
    }

    fn parse_placement(&mut self, field: &str) -> Result<(), EngineError> {
        let err = |reason| EngineError::InvalidFen { field: 0, reason };
        let mut rank = 7i8;
        let mut file = 0u8;
        for ch in field.chars() {
            match ch {
                '/' => {
                    if file != 8 || rank == 0 {
                        return Err(err("misplaced rank separator"));
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => {
                    file += ch as u8 - b'0';
                    if file > 8 {
                        return Err(err("rank overflows eight files"));
                    }
                }
                _ => {
                    let piece = Piece::from_fen_char(ch).ok_or(err("unknown piece letter"))?;
                    if file > 7 {
                        return Err(err("rank overflows eight files"));
                    }
                    self.place_piece(square_at(file, rank as u8), piece);
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err(err("expected eight ranks of eight files"));
        }
        Ok(())
    }

    fn parse_side(&mut self, field: &str) -> Result<(), EngineError> {
        self.side_to_move = match field {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(EngineError::InvalidFen { field: 1, reason: "side must be w or b" }),
        };
        Ok(())
    }

    fn parse_castling(&mut self, field: &str) -> Result<(), EngineError> {
        let err = || EngineError::InvalidFen { field: 2, reason: "bad castling field" };
        if field == "-" {
            return Ok(());
        }
        let mut rights = 0u8;
        for ch in field.chars() {
            let bit = match ch {
                'K' => CASTLE_WK,
                'Q' => CASTLE_WQ,
                'k' => CASTLE_BK,
                'q' => CASTLE_BQ,
                _ => return Err(err()),
            };
            if rights & bit != 0 {
                return Err(err());
            }
            rights |= bit;
        }
        self.states[0].castling = rights;
        self.states[0].key_part ^= castling_key(rights);
        Ok(())
    }

    fn parse_en_passant(&mut self, field: &str) -> Result<(), EngineError> {
        let err = EngineError::InvalidFen { field: 3, reason: "bad en-passant field" };
        if field == "-" {
            return Ok(());
        }
        let square = bitboard::algebraic_to_square(field).ok_or(err.clone())?;
        let expected_rank = if self.side_to_move == Color::White { 5 } else { 2 };
        if rank_of(square) != expected_rank {
            return Err(err);
        }
        // Record the square only when a pawn of the side to move actually
        // attacks it, so equal positions never hash apart on a phantom
        // en-passant file.
        let own_pawns = self.pieces(Piece::new(PieceType::Pawn, self.side_to_move));
        let attackers = pawn_attacks_from(square, self.side_to_move.opposite()) & own_pawns;
        if attackers != 0 {
            let state = self.states.last_mut().unwrap();
            state.ep = EP_PRESENT | file_of(square);
            state.key_part ^= en_passant_key(file_of(square));
        }
        Ok(())
    }

    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(90);
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                let piece = self.board[square_at(file, rank) as usize];
                if piece.is_none() {
                    empty += 1;
                } else {
                    if empty > 0 {
                        fen.push((b'0' + empty) as char);
                        empty = 0;
                    }
                    fen.push(piece.to_fen_char());
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.side_to_move == Color::White { 'w' } else { 'b' });

        fen.push(' ');
        let rights = self.state().castling;
        if rights == 0 {
            fen.push('-');
        } else {
            for (bit, ch) in [(CASTLE_WK, 'K'), (CASTLE_WQ, 'Q'), (CASTLE_BK, 'k'), (CASTLE_BQ, 'q')] {
                if rights & bit != 0 {
                    fen.push(ch);
                }
            }
        }

        fen.push(' ');
        match self.en_passant_square() {
            Some(square) => fen.push_str(&bitboard::square_to_algebraic(square)),
            None => fen.push('-'),
        }

        fen.push(' ');
        fen.push_str(&self.state().halfmove_clock.to_string());
        fen.push(' ');
        fen.push_str(&self.fullmove.to_string());
        fen
    }

    #[inline(always)]
    fn state(&self) -> &IrrState {
        self.states.last().unwrap()
    }

    #[inline(always)]
    fn state_mut(&mut self) -> &mut IrrState {
        self.states.last_mut().unwrap()
    }

    #[inline(always)]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline(always)]
    pub fn piece_at(&self, square: u8) -> Piece {
        self.board[square as usize]
    }

    #[inline(always)]
    pub fn pieces(&self, piece: Piece) -> Bitboard {
        self.type_bb[piece.piece_type() as usize] & self.color_bb[piece.color() as usize]
    }

    #[inline(always)]
    pub fn pieces_of(&self, piece_type: PieceType, color: Color) -> Bitboard {
        self.type_bb[piece_type as usize] & self.color_bb[color as usize]
    }

    #[inline(always)]
    pub fn color_pieces(&self, color: Color) -> Bitboard {
        self.color_bb[color as usize]
    }

    #[inline(always)]
    pub fn type_pieces(&self, piece_type: PieceType) -> Bitboard {
        self.type_bb[piece_type as usize]
    }

    #[inline(always)]
    pub fn occupancy(&self) -> Bitboard {
        self.color_bb[0] | self.color_bb[1]
    }

    #[inline(always)]
    pub fn king_square(&self, color: Color) -> u8 {
        bitboard::lsb_index(self.pieces_of(PieceType::King, color))
    }

    #[inline(always)]
    pub fn halfmove_clock(&self) -> u16 {
        self.state().halfmove_clock
    }

    #[inline(always)]
    pub fn fullmove_counter(&self) -> u16 {
        self.fullmove
    }

    #[inline(always)]
    pub fn castling_rights(&self) -> u8 {
        self.state().castling
    }

    #[inline(always)]
    pub fn has_castling_right(&self, bit: u8) -> bool {
        self.state().castling & bit != 0
    }

    /// The en-passant target square, reconstructed from the stored file and
    /// the side to move (rank 6 when white moves, rank 3 when black moves).
    #[inline(always)]
    pub fn en_passant_square(&self) -> Option<u8> {
        let ep = self.state().ep;
        if ep & EP_PRESENT == 0 {
            return None;
        }
        let rank = if self.side_to_move == Color::White { 5 } else { 2 };
        Some(square_at(ep & 0x7, rank))
    }

    /// Ply depth accumulated by make calls since construction.
    #[inline(always)]
    pub fn stack_depth(&self) -> usize {
        self.states.len() - 1
    }

    #[inline(always)]
    pub fn full_hash(&self) -> u64 {
        self.key ^ self.state().key_part
    }

    /// Recomputes the full hash from the board alone; the incremental hash
    /// must always agree with this.
    pub fn hash_from_scratch(&self) -> u64 {
        let mut key = 0u64;
        for square in 0..64u8 {
            let piece = self.board[square as usize];
            if !piece.is_none() {
                key ^= piece_key(piece.index(), square);
            }
        }
        if self.side_to_move == Color::Black {
            key ^= side_key();
        }
        key ^= castling_key(self.state().castling);
        if let Some(square) = self.en_passant_square() {
            key ^= en_passant_key(file_of(square));
        }
        key
    }

    /// Game phase in [0, 256] from remaining non-pawn material: 0 is the
    /// initial position, 256 is a bare endgame.
    pub fn phase(&self) -> i32 {
        const WEIGHTS: [i32; 6] = [0, 1, 1, 2, 4, 0];
        const NEUTRAL: i32 = 24;
        let mut remaining = 0;
        for piece_type in [PieceType::Knight, PieceType::Bishop, PieceType::Rook, PieceType::Queen] {
            remaining +=
                WEIGHTS[piece_type as usize] * popcount(self.type_bb[piece_type as usize]) as i32;
        }
        let spent = (NEUTRAL - remaining).max(0);
        (256 * spent + NEUTRAL / 2) / NEUTRAL
    }

    pub fn has_non_pawn_material(&self, color: Color) -> bool {
        let king_and_pawns =
            self.pieces_of(PieceType::King, color) | self.pieces_of(PieceType::Pawn, color);
        self.color_bb[color as usize] & !king_and_pawns != 0
    }

    #[inline(always)]
    fn place_piece(&mut self, square: u8, piece: Piece) {
        if !self.board[square as usize].is_none() {
            self.remove_piece(square);
        }
        let bb = square_bb(square);
        self.color_bb[piece.color() as usize] |= bb;
        self.type_bb[piece.piece_type() as usize] |= bb;
        self.board[square as usize] = piece;
        self.key ^= piece_key(piece.index(), square);
    }

    #[inline(always)]
    fn remove_piece(&mut self, square: u8) {
        let piece = self.board[square as usize];
        debug_assert!(!piece.is_none());
        let bb = square_bb(square);
        self.color_bb[piece.color() as usize] &= !bb;
        self.type_bb[piece.piece_type() as usize] &= !bb;
        self.board[square as usize] = Piece::NONE;
        self.key ^= piece_key(piece.index(), square);
    }

    #[inline(always)]
    fn remove_castling(&mut self, bits: u8) {
        let state = self.state_mut();
        let cleared = state.castling & bits;
        if cleared != 0 {
            state.key_part ^= castling_key(cleared);
            state.castling &= !bits;
        }
    }

    #[inline(always)]
    fn clear_en_passant(&mut self) {
        let state = self.state_mut();
        if state.ep & EP_PRESENT != 0 {
            state.key_part ^= en_passant_key(state.ep & 0x7);
            state.ep = 0;
        }
    }

    #[inline(always)]
    fn set_en_passant(&mut self, file: u8) {
        self.clear_en_passant();
        let state = self.state_mut();
        state.ep = EP_PRESENT | file;
        state.key_part ^= en_passant_key(file);
    }

    /// Drops the right bound to a rook's original corner when that corner is
    /// vacated or its occupant captured.
    #[inline(always)]
    fn remove_rook_castling(&mut self, square: u8) {
        match square {
            0 => self.remove_castling(CASTLE_WQ),
            7 => self.remove_castling(CASTLE_WK),
            56 => self.remove_castling(CASTLE_BQ),
            63 => self.remove_castling(CASTLE_BK),
            _ => {}
        }
    }

    fn castle_rook_squares(color: Color, kind: MoveKind) -> (u8, u8) {
        match (color, kind) {
            (Color::White, MoveKind::KingCastle) => (7, 5),
            (Color::White, _) => (0, 3),
            (Color::Black, MoveKind::KingCastle) => (63, 61),
            (Color::Black, _) => (56, 59),
        }
    }

    pub fn make_move(&mut self, m: Move) {
        debug_assert!(!m.is_null());
        let from = m.from();
        let to = m.to();
        let kind = m.kind();
        let piece = self.board[from as usize];
        let color = piece.color();
        debug_assert!(color == self.side_to_move);

        self.states.push(*self.state());
        self.state_mut().captured = Piece::NONE;

        match kind {
            MoveKind::Quiet => {
                self.clear_en_passant();
                self.state_mut().halfmove_clock += 1;
                self.remove_piece(from);
                self.place_piece(to, piece);
                match piece.piece_type() {
                    PieceType::Pawn => self.state_mut().halfmove_clock = 0,
                    PieceType::King => self.remove_castling(if color == Color::White {
                        CASTLE_WK | CASTLE_WQ
                    } else {
                        CASTLE_BK | CASTLE_BQ
                    }),
                    PieceType::Rook => self.remove_rook_castling(from),
                    _ => {}
                }
            }
            MoveKind::DoublePawnPush => {
                self.remove_piece(from);
                self.place_piece(to, piece);
                self.set_en_passant(file_of(from));
                self.state_mut().halfmove_clock = 0;
            }
            MoveKind::KingCastle | MoveKind::QueenCastle => {
                self.clear_en_passant();
                self.state_mut().halfmove_clock += 1;
                let (rook_from, rook_to) = Position::castle_rook_squares(color, kind);
                let rook = self.board[rook_from as usize];
                self.remove_piece(rook_from);
                self.place_piece(rook_to, rook);
                self.remove_piece(from);
                self.place_piece(to, piece);
                self.remove_castling(if color == Color::White {
                    CASTLE_WK | CASTLE_WQ
                } else {
                    CASTLE_BK | CASTLE_BQ
                });
            }
            MoveKind::Capture => {
                self.clear_en_passant();
                let victim = self.board[to as usize];
                self.state_mut().captured = victim;
                if victim.piece_type() == PieceType::Rook {
                    self.remove_rook_castling(to);
                }
                self.remove_piece(to);
                self.remove_piece(from);
                self.place_piece(to, piece);
                self.state_mut().halfmove_clock = 0;
                match piece.piece_type() {
                    PieceType::King => self.remove_castling(if color == Color::White {
                        CASTLE_WK | CASTLE_WQ
                    } else {
                        CASTLE_BK | CASTLE_BQ
                    }),
                    PieceType::Rook => self.remove_rook_castling(from),
                    _ => {}
                }
            }
            MoveKind::EpCapture => {
                self.clear_en_passant();
                let victim_square = if color == Color::White { to - 8 } else { to + 8 };
                let victim = self.board[victim_square as usize];
                self.state_mut().captured = victim;
                self.remove_piece(victim_square);
                self.remove_piece(from);
                self.place_piece(to, piece);
                self.state_mut().halfmove_clock = 0;
            }
            _ => {
                // The four promotion kinds and their capture variants.
                self.clear_en_passant();
                if m.is_capture() {
                    let victim = self.board[to as usize];
                    self.state_mut().captured = victim;
                    if victim.piece_type() == PieceType::Rook {
                        self.remove_rook_castling(to);
                    }
                    self.remove_piece(to);
                }
                self.remove_piece(from);
                let promoted = Piece::new(m.promotion_piece_type().unwrap(), color);
                self.place_piece(to, promoted);
                self.state_mut().halfmove_clock = 0;
            }
        }

        self.side_to_move = self.side_to_move.opposite();
        self.key ^= side_key();
        if color == Color::Black {
            self.fullmove += 1;
        }
    }

    pub fn unmake_move(&mut self, m: Move) {
        let from = m.from();
        let to = m.to();
        let kind = m.kind();
        let piece = self.board[to as usize];
        let color = piece.color();
        let captured = self.state().captured;

        match kind {
            MoveKind::Quiet | MoveKind::DoublePawnPush => {
                self.remove_piece(to);
                self.place_piece(from, piece);
            }
            MoveKind::KingCastle | MoveKind::QueenCastle => {
                let (rook_from, rook_to) = Position::castle_rook_squares(color, kind);
                let rook = self.board[rook_to as usize];
                self.remove_piece(rook_to);
                self.place_piece(rook_from, rook);
                self.remove_piece(to);
                self.place_piece(from, piece);
            }
            MoveKind::Capture => {
                self.remove_piece(to);
                self.place_piece(from, piece);
                self.place_piece(to, captured);
            }
            MoveKind::EpCapture => {
                let victim_square = if color == Color::White { to - 8 } else { to + 8 };
                self.remove_piece(to);
                self.place_piece(from, piece);
                self.place_piece(victim_square, captured);
            }
            _ => {
                self.remove_piece(to);
                self.place_piece(from, Piece::new(PieceType::Pawn, color));
                if m.is_capture() {
                    self.place_piece(to, captured);
                }
            }
        }

        self.states.pop();
        self.side_to_move = self.side_to_move.opposite();
        self.key ^= side_key();
        if color == Color::Black {
            self.fullmove -= 1;
        }
    }

    /// Passes the turn. Must not be called while the side to move is in
    /// check; the search guards that.
    pub fn make_null_move(&mut self) {
        self.states.push(*self.state());
        self.clear_en_passant();
        self.state_mut().halfmove_clock += 1;
        if self.side_to_move == Color::Black {
            self.fullmove += 1;
        }
        self.side_to_move = self.side_to_move.opposite();
        self.key ^= side_key();
    }

    pub fn unmake_null_move(&mut self) {
        self.states.pop();
        self.side_to_move = self.side_to_move.opposite();
        self.key ^= side_key();
        if self.side_to_move == Color::Black {
            self.fullmove -= 1;
        }
    }
}

/// Squares a pawn of `color` on `square` attacks. Local so FEN
/// canonicalisation does not depend on the attack tables.
#[inline(always)]
pub fn pawn_attacks_from(square: u8, color: Color) -> Bitboard {
    let bb = square_bb(square);
    match color {
        Color::White => bitboard::shift_northeast(bb) | bitboard::shift_northwest(bb),
        Color::Black => bitboard::shift_southeast(bb) | bitboard::shift_southwest(bb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_positions_identical(a: &Position, b: &Position) {
        assert_eq!(a.color_bb, b.color_bb);
        assert_eq!(a.type_bb, b.type_bb);
        assert_eq!(a.board[..], b.board[..]);
        assert_eq!(a.side_to_move, b.side_to_move);
        assert_eq!(a.fullmove, b.fullmove);
        assert_eq!(a.key, b.key);
        assert_eq!(a.states, b.states);
    }

    #[test]
    fn startpos_basics() {
        let pos = Position::startpos();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.castling_rights(), CASTLE_WK | CASTLE_WQ | CASTLE_BK | CASTLE_BQ);
        assert_eq!(pos.en_passant_square(), None);
        assert_eq!(popcount(pos.occupancy()), 32);
        assert_eq!(pos.king_square(Color::White), 4);
        assert_eq!(pos.king_square(Color::Black), 60);
        assert_eq!(pos.phase(), 0);
        assert_eq!(pos.full_hash(), pos.hash_from_scratch());
    }

    #[test]
    fn fen_round_trip() {
        for fen in [
            STARTPOS_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r2q1rk1/pP1p2pp/Q4n2/bbp1p3/Np6/1B3NBn/pPPP1PPP/R3K2R b KQ - 0 13",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert_eq!(pos.to_fen(), fen);
        }
    }

    #[test]
    fn fen_rejects_garbage() {
        for fen in [
            "",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1",
            "rnbqkbnr/pppppppp/9/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkqK - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e9 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - x 1",
        ] {
            assert!(Position::from_fen(fen).is_err(), "accepted: {fen}");
        }
    }

    #[test]
    fn fen_accepts_rule_illegal_setups() {
        // Nine pawns: syntactically valid, semantically absurd. Accepted by
        // design.
        let pos = Position::from_fen("k7/pppppppp/p7/8/8/8/8/K7 w - - 0 1").unwrap();
        assert_eq!(popcount(pos.pieces_of(PieceType::Pawn, Color::Black)), 9);
    }

    #[test]
    fn phantom_en_passant_is_cleared() {
        // e3 is a plausible en-passant square after 1. e4 but no black pawn
        // attacks it here, so the position must hash as if it never existed.
        let with_ep = Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        )
        .unwrap();
        let without_ep = Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        )
        .unwrap();
        assert_eq!(with_ep.en_passant_square(), None);
        assert_eq!(with_ep.full_hash(), without_ep.full_hash());
    }

    #[test]
    fn real_en_passant_is_kept() {
        let pos = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2",
        )
        .unwrap();
        assert_eq!(pos.en_passant_square(), Some(20));
    }

    #[test]
    fn make_unmake_restores_everything() {
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let reference = pos.clone();

        let moves = [
            Move::new(4, 6, MoveKind::KingCastle),
            Move::new(4, 2, MoveKind::QueenCastle),
            Move::new(36, 19, MoveKind::Quiet),
            Move::new(11, 20, MoveKind::Quiet),
            Move::new(21, 23, MoveKind::Capture),
            Move::new(8, 24, MoveKind::DoublePawnPush),
        ];
        for m in moves {
            pos.make_move(m);
            assert_eq!(pos.full_hash(), pos.hash_from_scratch(), "make {}", m.to_lan());
            pos.unmake_move(m);
            assert_eq!(pos.full_hash(), pos.hash_from_scratch(), "unmake {}", m.to_lan());
            assert_positions_identical(&pos, &reference);
        }
    }

    #[test]
    fn capture_sequence_keeps_hash_incremental() {
        let mut pos = Position::startpos();
        let line = [
            Move::new(12, 28, MoveKind::DoublePawnPush), // e2e4
            Move::new(51, 35, MoveKind::DoublePawnPush), // d7d5
            Move::new(28, 35, MoveKind::Capture),        // exd5
            Move::new(59, 35, MoveKind::Capture),        // Qxd5
        ];
        for m in line {
            pos.make_move(m);
            assert_eq!(pos.full_hash(), pos.hash_from_scratch());
        }
        assert_eq!(pos.stack_depth(), 4);
        for m in line.iter().rev() {
            pos.unmake_move(*m);
            assert_eq!(pos.full_hash(), pos.hash_from_scratch());
        }
        assert_eq!(pos.to_fen(), STARTPOS_FEN);
    }

    #[test]
    fn en_passant_capture_round_trip() {
        let mut pos = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2",
        )
        .unwrap();
        let reference = pos.clone();
        let ep = Move::new(27, 20, MoveKind::EpCapture); // d4xe3
        pos.make_move(ep);
        assert_eq!(pos.piece_at(28), Piece::NONE, "captured pawn removed from e4");
        assert_eq!(pos.piece_at(20), Piece::new(PieceType::Pawn, Color::Black));
        assert_eq!(pos.full_hash(), pos.hash_from_scratch());
        pos.unmake_move(ep);
        assert_positions_identical(&pos, &reference);
    }

    #[test]
    fn promotion_round_trip() {
        let mut pos = Position::from_fen("r3k3/1P6/8/8/8/8/8/4K3 w q - 0 1").unwrap();
        let reference = pos.clone();
        for kind in [
            MoveKind::QueenPromotion,
            MoveKind::KnightPromotion,
            MoveKind::RookPromotion,
            MoveKind::BishopPromotion,
        ] {
            let m = Move::new(49, 57, kind);
            pos.make_move(m);
            assert_eq!(
                pos.piece_at(57),
                Piece::new(m.promotion_piece_type().unwrap(), Color::White)
            );
            assert_eq!(pos.halfmove_clock(), 0);
            pos.unmake_move(m);
            assert_positions_identical(&pos, &reference);
        }

        // Promotion capturing the a8 rook also strips black's queen-side
        // right.
        let capture = Move::new(49, 56, MoveKind::QueenPromotionCapture);
        pos.make_move(capture);
        assert_eq!(pos.castling_rights(), 0);
        assert_eq!(pos.full_hash(), pos.hash_from_scratch());
        pos.unmake_move(capture);
        assert_positions_identical(&pos, &reference);
    }

    #[test]
    fn rook_moves_drop_rights() {
        let mut pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        pos.make_move(Move::new(0, 8, MoveKind::Quiet)); // Ra1a2
        assert!(!pos.has_castling_right(CASTLE_WQ));
        assert!(pos.has_castling_right(CASTLE_WK));
        pos.make_move(Move::new(63, 55, MoveKind::Quiet)); // Rh8h7
        assert!(!pos.has_castling_right(CASTLE_BK));
        assert!(pos.has_castling_right(CASTLE_BQ));
        assert_eq!(pos.full_hash(), pos.hash_from_scratch());
    }

    #[test]
    fn null_move_round_trip() {
        let mut pos = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2",
        )
        .unwrap();
        let reference = pos.clone();
        pos.make_null_move();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.en_passant_square(), None);
        assert_eq!(pos.halfmove_clock(), 1);
        assert_eq!(pos.full_hash(), pos.hash_from_scratch());
        pos.unmake_null_move();
        assert_positions_identical(&pos, &reference);
    }

    #[test]
    fn phase_tracks_material() {
        assert_eq!(Position::startpos().phase(), 0);
        let bare = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(bare.phase(), 256);
        let middling = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1").unwrap();
        assert!(middling.phase() > 128 && middling.phase() < 256);
    }

    #[test]
    fn lan_formatting() {
        assert_eq!(Move::new(12, 28, MoveKind::DoublePawnPush).to_lan(), "e2e4");
        assert_eq!(Move::new(48, 56, MoveKind::QueenPromotion).to_lan(), "a7a8q");
        assert_eq!(Move::new(49, 56, MoveKind::KnightPromotionCapture).to_lan(), "b7a8n");
        assert_eq!(Move::NULL.to_lan(), "");
    }
}
