use crate::{
    config::IndicatorConfig,
    ports::{Indicator, LedOutput},
    time::elapsed_ms,
    types::TargetMode,
};

/// Off time before and after the blinks, in cycles.
const PAUSE_CYCLES: u32 = 5;

/// Blinks the mode (one blink for high, two for low), then shows a steady
/// glow while enabled and stays dark while disabled.
#[derive(Debug)]
pub struct BlinkIndicator<L> {
    led: L,
    config: IndicatorConfig,
    pattern: Option<BlinkPattern>,
    level: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlinkPattern {
    started_at: u32,
    blinks: u32,
}

impl BlinkPattern {
    /// `None` once the pattern has run to completion.
    fn level_at(&self, elapsed: u32, config: &IndicatorConfig) -> Option<u8> {
        let cycle = config.cycle_ms;
        let pause = cycle.saturating_mul(PAUSE_CYCLES);
        let blinks_end = pause.saturating_add(self.blinks.saturating_mul(cycle.saturating_mul(2)));
        let end = blinks_end.saturating_add(pause);

        if elapsed >= end {
            return None;
        }
        if elapsed < pause || elapsed >= blinks_end {
            return Some(0);
        }

        let within_blink = (elapsed - pause) % cycle.saturating_mul(2);
        if within_blink < cycle {
            Some(config.brightness.saturating_mul(2))
        } else {
            Some(0)
        }
    }
}

pub fn blink_count(mode: TargetMode) -> u32 {
    match mode {
        TargetMode::High => 1,
        TargetMode::Low => 2,
    }
}

impl<L: LedOutput> BlinkIndicator<L> {
    pub fn new(led: L, config: IndicatorConfig) -> Self {
        Self {
            led,
            config,
            pattern: None,
            level: None,
        }
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn is_blinking(&self) -> bool {
        self.pattern.is_some()
    }

    fn write(&mut self, level: u8) {
        if self.level != Some(level) {
            self.led.set_level(level);
            self.level = Some(level);
        }
    }
}

impl<L: LedOutput> Indicator for BlinkIndicator<L> {
    fn show_mode(&mut self, mode: TargetMode, now_ms: u32) {
        self.pattern = Some(BlinkPattern {
            started_at: now_ms,
            blinks: blink_count(mode),
        });
        self.write(0);
    }

    fn refresh(&mut self, enabled: bool, now_ms: u32) {
        let blinking = self.pattern.and_then(|pattern| {
            pattern.level_at(elapsed_ms(now_ms, pattern.started_at), &self.config)
        });

        let level = match blinking {
            Some(level) => level,
            None => {
                self.pattern = None;
                if enabled {
                    self.config.brightness
                } else {
                    0
                }
            }
        };
        self.write(level);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::RecordingLed;

    fn indicator() -> BlinkIndicator<RecordingLed> {
        BlinkIndicator::new(RecordingLed::default(), IndicatorConfig::default())
    }

    fn run(indicator: &mut BlinkIndicator<RecordingLed>, enabled: bool, from: u32, to: u32) {
        let mut now = from;
        while now < to {
            indicator.refresh(enabled, now);
            now += 10;
        }
    }

    #[test]
    fn high_mode_blinks_once() {
        let mut indicator = indicator();
        indicator.show_mode(TargetMode::High, 0);

        run(&mut indicator, true, 0, 1_300);

        // off, one bright blink, off, then steady glow
        assert_eq!(indicator.led().levels, vec![0, 2, 0, 1]);
        assert!(!indicator.is_blinking());
    }

    #[test]
    fn low_mode_blinks_twice() {
        let mut indicator = indicator();
        indicator.show_mode(TargetMode::Low, 0);

        run(&mut indicator, true, 0, 1_500);

        assert_eq!(indicator.led().levels, vec![0, 2, 0, 2, 0, 1]);
    }

    #[test]
    fn blink_timing_matches_cycles() {
        let config = IndicatorConfig::default();
        let pattern = BlinkPattern {
            started_at: 0,
            blinks: 2,
        };

        assert_eq!(pattern.level_at(499, &config), Some(0));
        assert_eq!(pattern.level_at(500, &config), Some(2));
        assert_eq!(pattern.level_at(600, &config), Some(0));
        assert_eq!(pattern.level_at(700, &config), Some(2));
        assert_eq!(pattern.level_at(900, &config), Some(0));
        assert_eq!(pattern.level_at(1_399, &config), Some(0));
        assert_eq!(pattern.level_at(1_400, &config), None);
    }

    #[test]
    fn disabled_stays_dark_after_pattern() {
        let mut indicator = indicator();
        indicator.show_mode(TargetMode::High, 0);

        run(&mut indicator, false, 0, 2_000);

        assert_eq!(indicator.led().levels, vec![0, 2, 0]);
    }

    #[test]
    fn follows_enabled_flag_without_pattern() {
        let mut indicator = indicator();

        indicator.refresh(true, 0);
        indicator.refresh(true, 10);
        indicator.refresh(false, 20);

        assert_eq!(indicator.led().levels, vec![1, 0]);
    }

    #[test]
    fn new_mode_restarts_pattern() {
        let mut indicator = indicator();
        indicator.refresh(true, 0);
        indicator.show_mode(TargetMode::High, 100);
        indicator.refresh(true, 150);

        assert!(indicator.is_blinking());
        assert_eq!(indicator.led().levels, vec![1, 0]);
    }
}
