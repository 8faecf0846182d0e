//! Turns-per-second telemetry between alive-cell reports.

use std::time::Instant;

/// Tracks how fast turns are completing from one report to the next.
#[derive(Debug)]
pub struct TurnRate {
    last_turn: u64,
    last_time: Instant,
}

impl TurnRate {
    pub fn new(start_turn: u64) -> Self {
        Self {
            last_turn: start_turn,
            last_time: Instant::now(),
        }
    }

    /// Record a report at `turn` and return the turns/second since the
    /// previous one.
    pub fn record(&mut self, turn: u64) -> f64 {
        let now = Instant::now();
        let turns = turn.saturating_sub(self.last_turn) as f64;
        let seconds = now.duration_since(self.last_time).as_secs_f64();
        self.last_turn = turn;
        self.last_time = now;
        if seconds > 0.0 {
            turns / seconds
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rate_reflects_turn_progress() {
        let mut rate = TurnRate::new(0);
        std::thread::sleep(Duration::from_millis(50));
        let first = rate.record(10);
        assert!(first > 0.0);
        assert!(first <= 10.0 / 0.05);

        // No progress means a zero rate.
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(rate.record(10), 0.0);
    }

    #[test]
    fn turns_behind_the_baseline_do_not_underflow() {
        let mut rate = TurnRate::new(100);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(rate.record(40), 0.0);
    }
}
