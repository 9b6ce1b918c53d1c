use crate::board::position::{Move, MoveKind, PieceType, Position};
use crate::eval::material::piece_value;
use crate::eval::pst;
use crate::eval::see::wins_exchange;
use crate::movegen::{generate, GenType, MoveList, ScoredMove};
use crate::search::history::HistoryTables;

const KILLER_ONE_BONUS: i32 = 90_000;
const KILLER_TWO_BONUS: i32 = 80_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    TtMove,
    CaptureInit,
    GoodCaptures,
    QuietInit,
    Quiets,
    BadCaptures,
    Done,
}

/// Single-pass staged move iterator: hash move, then captures that survive
/// an exchange test in MVV-LVA order, then sorted quiets, then the deferred
/// losing captures. Generation and sorting happen per stage, so a cutoff on
/// the hash move or an early capture never pays for the quiets.
///
/// Captures are generated into the front of the buffer; once a capture has
/// been examined its slot is dead, which is where deferred bad captures are
/// compacted. Quiets go into the tail after the capture region.
pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    killers: [Move; 2],
    captures_only: bool,
    list: MoveList,
    captures_end: usize,
    cursor: usize,
    bad_end: usize,
    bad_cursor: usize,
}

impl MovePicker {
    pub fn new(tt_move: Move, killers: [Move; 2]) -> MovePicker {
        MovePicker {
            stage: Stage::TtMove,
            tt_move,
            killers,
            captures_only: false,
            list: MoveList::new(),
            captures_end: 0,
            cursor: 0,
            bad_end: 0,
            bad_cursor: 0,
        }
    }

    /// Capture-only picker for quiescence. The hash move is yielded only
    /// when it is itself a capture.
    pub fn new_quiescence(tt_move: Move) -> MovePicker {
        let tt_move = if tt_move.is_capture() { tt_move } else { Move::NULL };
        MovePicker {
            captures_only: true,
            ..MovePicker::new(tt_move, [Move::NULL; 2])
        }
    }

    pub fn next(&mut self, pos: &Position, history: &HistoryTables) -> Option<Move> {
        loop {
            match self.stage {
                Stage::TtMove => {
                    self.stage = Stage::CaptureInit;
                    if !self.tt_move.is_null() {
                        return Some(self.tt_move);
                    }
                }
                Stage::CaptureInit => {
                    generate(pos, GenType::Captures, &mut self.list);
                    self.captures_end = self.list.len();
                    score_captures(pos, history, &mut self.list[..]);
                    insertion_sort(&mut self.list[..]);
                    self.cursor = 0;
                    self.bad_end = 0;
                    self.stage = Stage::GoodCaptures;
                }
                Stage::GoodCaptures => {
                    while self.cursor < self.captures_end {
                        let sm = self.list[self.cursor];
                        self.cursor += 1;
                        if sm.mv == self.tt_move {
                            continue;
                        }
                        if wins_exchange(pos, sm.mv, -sm.score / 8) {
                            return Some(sm.mv);
                        }
                        // Losing capture: park it for the last stage.
                        self.list[self.bad_end] = sm;
                        self.bad_end += 1;
                    }
                    self.bad_cursor = 0;
                    self.stage =
                        if self.captures_only { Stage::BadCaptures } else { Stage::QuietInit };
                }
                Stage::QuietInit => {
                    let quiet_start = self.list.len();
                    generate(pos, GenType::Quiets, &mut self.list);
                    score_quiets(pos, history, self.killers, &mut self.list[quiet_start..]);
                    insertion_sort(&mut self.list[quiet_start..]);
                    self.cursor = quiet_start;
                    self.stage = Stage::Quiets;
                }
                Stage::Quiets => {
                    while self.cursor < self.list.len() {
                        let sm = self.list[self.cursor];
                        self.cursor += 1;
                        if sm.mv == self.tt_move {
                            continue;
                        }
                        return Some(sm.mv);
                    }
                    self.stage = Stage::BadCaptures;
                }
                Stage::BadCaptures => {
                    if self.bad_cursor < self.bad_end {
                        let sm = self.list[self.bad_cursor];
                        self.bad_cursor += 1;
                        return Some(sm.mv);
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => return None,
            }
        }
    }
}

fn score_captures(pos: &Position, history: &HistoryTables, captures: &mut [ScoredMove]) {
    let side = pos.side_to_move();
    for sm in captures.iter_mut() {
        let attacker = pos.piece_at(sm.mv.from()).piece_type();
        let victim = if sm.mv.kind() == MoveKind::EpCapture {
            PieceType::Pawn
        } else {
            pos.piece_at(sm.mv.to()).piece_type()
        };
        sm.score = 10 * piece_value(victim) - piece_value(attacker) / 10
            + pst::mg(attacker, sm.mv.to(), side)
            - pst::mg(attacker, sm.mv.from(), side)
            + history.capture_score(side, attacker, sm.mv.to(), victim) / 32;
    }
}

fn score_quiets(
    pos: &Position,
    history: &HistoryTables,
    killers: [Move; 2],
    quiets: &mut [ScoredMove],
) {
    let side = pos.side_to_move();
    for sm in quiets.iter_mut() {
        let piece = pos.piece_at(sm.mv.from()).piece_type();
        sm.score = history.quiet_score(side, piece, sm.mv);
        if sm.mv == killers[0] {
            sm.score += KILLER_ONE_BONUS;
        } else if sm.mv == killers[1] {
            sm.score += KILLER_TWO_BONUS;
        }
    }
}

fn insertion_sort(moves: &mut [ScoredMove]) {
    for i in 1..moves.len() {
        let current = moves[i];
        let mut j = i;
        while j > 0 && moves[j - 1].score < current.score {
            moves[j] = moves[j - 1];
            j -= 1;
        }
        moves[j] = current;
    }
}
