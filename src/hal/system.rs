//! Wall-clock time source for hosted builds.

use std::time::{Duration, Instant};

use crate::traits::Clock;

/// Monotonic clock measured from construction.
///
/// All timestamps share one `start_time`, so deadlines computed from
/// [`Clock::now_ms`] stay consistent for the life of the station.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    start_time: Instant,
}

impl SystemClock {
    /// Starts counting from now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_moves_time_forward() {
        let clock = SystemClock::new();
        let before = clock.now_ms();
        clock.sleep_ms(5);
        assert!(clock.now_ms() >= before + 5);
    }
}
