use std::time::Instant;

use crate::ports::Clock;

/// Milliseconds from `since_ms` to `now_ms` on a wrapping `u32` counter.
pub fn elapsed_ms(now_ms: u32, since_ms: u32) -> u32 {
    now_ms.wrapping_sub(since_ms)
}

pub fn has_elapsed(now_ms: u32, since_ms: u32, duration_ms: u32) -> bool {
    elapsed_ms(now_ms, since_ms) >= duration_ms
}

/// Process-relative clock that wraps every ~49.7 days, like an MCU tick counter.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.start.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_survives_counter_wrap() {
        let before_wrap = u32::MAX - 99;
        assert_eq!(elapsed_ms(150, before_wrap), 250);
        assert!(has_elapsed(150, before_wrap, 250));
        assert!(!has_elapsed(149, before_wrap, 250));
    }

    #[test]
    fn monotonic_clock_starts_near_zero() {
        let clock = MonotonicClock::new();
        assert!(clock.now_ms() < 1_000);
    }
}
