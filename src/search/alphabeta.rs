use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::board::position::{Move, PieceType, Position};
use crate::engine::{self, Info, InfoFlags, SearchRequest};
use crate::error::EngineError;
use crate::eval::evaluate::evaluate;
use crate::movegen::{self, is_in_check, lan_to_move};
use crate::search::history::{HistoryTables, HISTORY_MAX};
use crate::search::movepick::MovePicker;
use crate::search::time_management::TimeManager;
use crate::search::transposition::{
    score_from_tt, score_to_tt, Bound, NodeData, TranspositionTable,
};
use crate::search::{INF, MATE_BOUND, MAX_DEPTH, MAX_PLY};

/// Stop conditions are polled once per this many nodes; between polls the
/// search runs free of clock reads.
const NODE_POLL_INTERVAL: u64 = 1024;

const FUTILITY_MARGIN_PER_DEPTH: i32 = 150;
const NULL_MOVE_MIN_DEPTH: i32 = 5;
const NULL_MOVE_REDUCTION: i32 = 4;
const HISTORY_DELTA_PER_DEPTH: i32 = 150;

struct SearchState {
    pos: Position,
    nodes: u64,
    best_move: Move,
    start: Instant,
    stop: Arc<AtomicBool>,
    node_limit: u64,
    timer: TimeManager,
    history: HistoryTables,
    /// Hashes of the positions replayed before the root, oldest first.
    prev_hashes: Vec<u64>,
    /// Hash of the position at each ply of the current line.
    hash_stack: Vec<u64>,
}

impl SearchState {
    #[inline(always)]
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn poll_limits(&self) {
        if self.timer.time_is_up() || self.nodes >= self.node_limit {
            self.stop.store(true, Ordering::Relaxed);
        }
    }

    /// Two-fold repetition against the current line or the pre-root
    /// history. Only positions since the last irreversible move can
    /// repeat, so the walk is capped by the halfmove clock.
    fn is_repetition(&self, ply: i32) -> bool {
        let current = self.hash_stack[ply as usize];
        let mut lookback = self.pos.halfmove_clock() as usize;

        let mut i = ply as usize;
        while i > 0 && lookback > 0 {
            i -= 1;
            lookback -= 1;
            if self.hash_stack[i] == current {
                return true;
            }
        }
        let mut j = self.prev_hashes.len();
        while j > 0 && lookback > 0 {
            j -= 1;
            lookback -= 1;
            if self.prev_hashes[j] == current {
                return true;
            }
        }
        false
    }

    fn victim_type(&self, m: Move) -> PieceType {
        if m.kind() == crate::board::position::MoveKind::EpCapture {
            PieceType::Pawn
        } else {
            self.pos.piece_at(m.to()).piece_type()
        }
    }

    /// Fail-high bookkeeping: killer slot and gravity updates, a bonus for
    /// the refutation and a malus for the moves tried before it.
    fn register_cutoff(
        &mut self,
        ply: i32,
        m: Move,
        depth: i32,
        tried_quiets: &[Move],
        tried_captures: &[Move],
    ) {
        let side = self.pos.side_to_move();
        let delta = (HISTORY_DELTA_PER_DEPTH * depth).min(HISTORY_MAX);

        if m.is_quiet() {
            self.history.store_killer(ply as usize, m);
            let piece = self.pos.piece_at(m.from()).piece_type();
            self.history.update_quiet(side, piece, m, delta);
            for &quiet in tried_quiets {
                let piece = self.pos.piece_at(quiet.from()).piece_type();
                self.history.update_quiet(side, piece, quiet, -delta);
            }
        } else if m.is_capture() {
            let piece = self.pos.piece_at(m.from()).piece_type();
            self.history.update_capture(side, piece, m.to(), self.victim_type(m), delta);
        }
        for &capture in tried_captures {
            let piece = self.pos.piece_at(capture.from()).piece_type();
            self.history
                .update_capture(side, piece, capture.to(), self.victim_type(capture), -delta);
        }
    }
}

/// Runs a full search request to completion in the calling thread: applies
/// the move prefix, iteratively deepens, reports progress between
/// iterations and the best move exactly once at the end. Sets the stop
/// flag before returning so the adapter can observe completion.
pub fn search(mut request: SearchRequest) -> Result<(), EngineError> {
    crate::init();

    let mut pos = Position::from_fen(&request.fen)?;
    let mut prev_hashes = Vec::with_capacity(request.moves.len());
    for lan in &request.moves {
        let m = lan_to_move(&pos, lan)?;
        prev_hashes.push(pos.full_hash());
        pos.make_move(m);
    }

    let start = Instant::now();
    let timer = if let Some(movetime) = request.movetime {
        TimeManager::fixed(start, movetime)
    } else if let Some(remaining) = request.time[pos.side_to_move() as usize] {
        TimeManager::from_clock(start, remaining, request.movestogo, pos.phase())
    } else {
        TimeManager::infinite()
    };

    let max_depth = request.depth.unwrap_or(MAX_DEPTH).clamp(1, MAX_DEPTH);
    let mut state = SearchState {
        pos,
        nodes: 0,
        best_move: Move::NULL,
        start,
        stop: request.stop.clone(),
        node_limit: request.nodes.unwrap_or(u64::MAX),
        timer,
        history: HistoryTables::new(),
        prev_hashes,
        hash_stack: vec![0; MAX_PLY as usize + 1],
    };

    let mut tt = engine::lock_tt();

    let mut best_move = Move::NULL;
    for depth in 1..=max_depth {
        let iteration_start = Instant::now();
        let nodes_before = state.nodes;

        let score = negamax(&mut state, &mut tt, 0, -INF, INF, depth, false);

        if state.stopped() {
            // An aborted iteration is discarded, except that an aborted
            // depth 1 still donates its partial best move so a move is
            // always reported.
            if depth == 1 {
                best_move = state.best_move;
            }
            break;
        }

        let iteration_ms = (iteration_start.elapsed().as_millis() as u64).max(1);
        let mut info = Info {
            flags: InfoFlags::DEPTH | InfoFlags::NODES | InfoFlags::NPS | InfoFlags::TIME,
            depth,
            nodes: state.nodes,
            nps: (state.nodes - nodes_before) * 1000 / iteration_ms,
            time: state.start.elapsed().as_millis() as u64,
            cp: 0,
            mate: 0,
        };
        if score >= MATE_BOUND {
            info.flags |= InfoFlags::MATE;
            info.mate = (INF - score + 1) / 2;
        } else if score <= -MATE_BOUND {
            info.flags |= InfoFlags::MATE;
            info.mate = -(INF + score + 1) / 2;
        } else {
            info.flags |= InfoFlags::CP;
            info.cp = score;
        }
        (request.info_sender)(&info);

        best_move = state.best_move;

        if let Some(mate_limit) = request.mate {
            if info.flags.contains(InfoFlags::MATE) && info.mate > 0 && info.mate <= mate_limit {
                break;
            }
        }
    }

    (request.best_move_sender)(best_move);
    request.stop.store(true, Ordering::Relaxed);
    Ok(())
}

fn negamax(
    state: &mut SearchState,
    tt: &mut TranspositionTable,
    ply: i32,
    mut alpha: i32,
    beta: i32,
    depth: i32,
    did_null: bool,
) -> i32 {
    if state.nodes % NODE_POLL_INTERVAL == 0 {
        state.poll_limits();
    }
    // Never bail from the root: depth 1 must complete far enough to have a
    // move to report.
    if ply > 0 && state.stopped() {
        return 0;
    }

    if depth == 0 {
        return qsearch(state, tt, ply, alpha, beta);
    }

    if ply > 0 {
        state.nodes += 1;
    }

    let hash = state.pos.full_hash();
    state.hash_stack[ply as usize] = hash;

    if ply > 0 && state.is_repetition(ply) {
        return 0;
    }

    let mut tt_move = Move::NULL;
    if let Some(entry) = tt.probe(hash) {
        tt_move = entry.best_move;
        if ply > 0 && i32::from(entry.depth) >= depth {
            let score = score_from_tt(i32::from(entry.score), ply);
            match entry.bound {
                Bound::Exact => return score,
                // A lower bound at or above beta guarantees the fail-high
                // without searching; an upper bound at or below alpha
                // guarantees the fail-low.
                Bound::Lower if score >= beta => return score,
                Bound::Upper if score <= alpha => return score,
                _ => {}
            }
        }
    }

    let in_check = is_in_check(&state.pos);
    let static_eval = if in_check { -INF } else { evaluate(&state.pos) };

    // Null move: with real material on the board and a static eval already
    // at beta, handing the opponent a free move and still failing high at
    // reduced depth is strong evidence for the real fail-high.
    if !in_check
        && ply > 0
        && depth >= NULL_MOVE_MIN_DEPTH
        && !did_null
        && state.pos.has_non_pawn_material(state.pos.side_to_move())
        && static_eval >= beta
    {
        state.pos.make_null_move();
        let score = -negamax(
            state,
            tt,
            ply + 1,
            -beta,
            -beta + 1,
            depth - NULL_MOVE_REDUCTION,
            true,
        );
        state.pos.unmake_null_move();
        if state.stopped() {
            return 0;
        }
        if score >= beta {
            return beta;
        }
    }

    // Reverse futility: an eval this far above beta will not come back
    // down within the remaining depth.
    if !in_check
        && beta.abs() < MATE_BOUND
        && static_eval - depth * FUTILITY_MARGIN_PER_DEPTH >= beta
    {
        return static_eval - depth * FUTILITY_MARGIN_PER_DEPTH;
    }

    let killers = state.history.killers(ply as usize);
    let mut picker = MovePicker::new(tt_move, killers);

    let mut best_score = -INF;
    let mut best_move = Move::NULL;
    let mut bound = Bound::Upper;
    let mut legal_moves = 0u32;
    let mut tried_quiets = [Move::NULL; 64];
    let mut tried_quiet_count = 0usize;
    let mut tried_captures = [Move::NULL; 32];
    let mut tried_capture_count = 0usize;

    while let Some(m) = picker.next(&state.pos, &state.history) {
        // Futility: once one move is on the books, quiet moves cannot lift
        // an eval this far below alpha back above it.
        if legal_moves > 0
            && !in_check
            && !m.is_capture()
            && static_eval + depth * FUTILITY_MARGIN_PER_DEPTH <= alpha
        {
            break;
        }
        if !movegen::is_legal(&mut state.pos, m) {
            continue;
        }
        legal_moves += 1;

        state.pos.make_move(m);
        let score = -negamax(state, tt, ply + 1, -beta, -alpha, depth - 1, false);
        state.pos.unmake_move(m);

        // A stopped child returned garbage; drop the iteration here. The
        // root keeps whatever it latched from the children that finished.
        if state.stopped() {
            if ply > 0 {
                return 0;
            }
            break;
        }

        if score > best_score {
            best_score = score;
            if score > alpha {
                best_move = m;
                if score >= beta {
                    bound = Bound::Lower;
                    state.register_cutoff(
                        ply,
                        m,
                        depth,
                        &tried_quiets[..tried_quiet_count],
                        &tried_captures[..tried_capture_count],
                    );
                    break;
                }
                bound = Bound::Exact;
                alpha = score;
            }
        }

        if m.is_quiet() {
            if tried_quiet_count < tried_quiets.len() {
                tried_quiets[tried_quiet_count] = m;
                tried_quiet_count += 1;
            }
        } else if m.is_capture() && tried_capture_count < tried_captures.len() {
            tried_captures[tried_capture_count] = m;
            tried_capture_count += 1;
        }
    }

    if legal_moves == 0 {
        best_score = if in_check { -INF + ply } else { 0 };
    }

    if ply > 0 {
        tt.store(NodeData {
            score: score_to_tt(best_score, ply) as i16,
            depth: depth.min(255) as u8,
            bound,
            best_move,
            hash,
        });
    } else {
        state.best_move = best_move;
    }

    best_score
}

/// Captures-only extension of the leaf evaluation: stand pat on the static
/// eval, then try every capture until the position is quiet.
fn qsearch(
    state: &mut SearchState,
    tt: &mut TranspositionTable,
    ply: i32,
    mut alpha: i32,
    beta: i32,
) -> i32 {
    if state.nodes % NODE_POLL_INTERVAL == 0 {
        state.poll_limits();
    }
    if state.stopped() {
        return 0;
    }

    state.nodes += 1;

    let hash = state.pos.full_hash();
    let mut tt_move = Move::NULL;
    if let Some(entry) = tt.probe(hash) {
        tt_move = entry.best_move;
        if ply > 0 {
            let score = score_from_tt(i32::from(entry.score), ply);
            match entry.bound {
                Bound::Exact => return score,
                Bound::Lower if score >= beta => return score,
                Bound::Upper if score <= alpha => return score,
                _ => {}
            }
        }
    }

    let in_check = is_in_check(&state.pos);
    let stand_pat = evaluate(&state.pos);
    if !in_check && stand_pat >= beta {
        return stand_pat;
    }
    if stand_pat > alpha {
        alpha = stand_pat;
    }

    let mut best_score = stand_pat;
    let mut best_move = Move::NULL;
    let mut bound = Bound::Upper;

    let mut picker = MovePicker::new_quiescence(tt_move);
    while let Some(m) = picker.next(&state.pos, &state.history) {
        if !movegen::is_legal(&mut state.pos, m) {
            continue;
        }

        state.pos.make_move(m);
        let score = -qsearch(state, tt, ply + 1, -beta, -alpha);
        state.pos.unmake_move(m);

        if state.stopped() {
            return 0;
        }

        if score > best_score {
            best_score = score;
            if score > alpha {
                best_move = m;
                if score >= beta {
                    bound = Bound::Lower;
                    break;
                }
                bound = Bound::Exact;
                alpha = score;
            }
        }
    }

    if ply > 0 {
        tt.store(NodeData {
            score: score_to_tt(best_score, ply) as i16,
            depth: 0,
            bound,
            best_move,
            hash,
        });
    }

    best_score
}
