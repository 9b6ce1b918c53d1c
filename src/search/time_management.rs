use std::time::{Duration, Instant};

/// Converts the clock situation into an absolute stop time. The allocation
/// never tries to be clever mid-search; the search polls `time_is_up`
/// at a coarse node interval and treats it as a hard deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeManager {
    stop_time: Option<Instant>,
}

const AVERAGE_GAME_LENGTH: u32 = 40;

impl TimeManager {
    pub fn infinite() -> TimeManager {
        TimeManager { stop_time: None }
    }

    pub fn fixed(start: Instant, movetime_ms: u64) -> TimeManager {
        TimeManager { stop_time: Some(start + Duration::from_millis(movetime_ms)) }
    }

    /// Budgets a slice of the remaining clock for this move.
    pub fn from_clock(start: Instant, remaining_ms: u64, movestogo: u32, phase: i32) -> TimeManager {
        let budget = allocate(remaining_ms, movestogo, phase);
        TimeManager { stop_time: Some(start + Duration::from_millis(budget)) }
    }

    #[inline(always)]
    pub fn time_is_up(&self) -> bool {
        match self.stop_time {
            Some(stop) => Instant::now() >= stop,
            None => false,
        }
    }
}

/// How many milliseconds of a `remaining` clock to spend on one move.
///
/// With one move left to the time control the whole clock is available in
/// principle, but spending all of it would forfeit on any scheduling
/// hiccup, so the fraction `(t/1000)^1.1 / (t/1000 + 1)^1.1` keeps a buffer
/// that grows as the clock shrinks. Otherwise the clock is divided by an
/// estimate of the moves still coming, interpolated by game phase between
/// a full game's average and a safe minimum of eight.
fn allocate(remaining_ms: u64, movestogo: u32, phase: i32) -> u64 {
    if movestogo == 1 {
        let seconds = remaining_ms as f64 / 1000.0;
        let factor = seconds.powf(1.1) / (seconds + 1.0).powf(1.1);
        return (remaining_ms as f64 * factor) as u64;
    }

    let horizon = if movestogo > 0 && movestogo < AVERAGE_GAME_LENGTH {
        movestogo as f64
    } else {
        AVERAGE_GAME_LENGTH as f64
    };
    let divisor = (horizon * (256.0 - phase as f64) + 8.0 * phase as f64) / 256.0;
    (remaining_ms as f64 / divisor) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_allocation_divides_by_game_length() {
        // Phase 0: divisor is exactly the average game length.
        assert_eq!(allocate(60_000, 0, 0), 1_500);
        assert_eq!(allocate(60_000, 60, 0), 1_500);
    }

    #[test]
    fn endgame_allocation_spends_more_per_move() {
        // Phase 256: divisor collapses to the safe minimum of eight.
        assert_eq!(allocate(8_000, 0, 256), 1_000);
        assert!(allocate(60_000, 0, 256) > allocate(60_000, 0, 0));
    }

    #[test]
    fn movestogo_caps_the_horizon() {
        assert_eq!(allocate(30_000, 10, 0), 3_000);
        // Beyond the average game length the cap takes over.
        assert_eq!(allocate(30_000, 100, 0), 750);
    }

    #[test]
    fn last_move_keeps_a_safety_buffer() {
        let budget = allocate(1_000, 1, 0);
        assert!(budget > 400 && budget < 500, "got {budget}");
        // More time on the clock means a thinner relative buffer.
        let long = allocate(60_000, 1, 0);
        assert!(long > 55_000 && long < 60_000, "got {long}");
    }

    #[test]
    fn deadline_is_absolute() {
        let manager = TimeManager::fixed(Instant::now(), 0);
        assert!(manager.time_is_up());
        assert!(!TimeManager::infinite().time_is_up());
    }
}
