use crate::{
    config::ButtonConfig,
    time::has_elapsed,
    types::InputEvent,
};

/// Turns raw button samples into click / long-press gestures.
///
/// A level change is accepted once it has been stable for `debounce_ms`.
/// Releasing before `long_press_ms` is a [`InputEvent::ShortPress`]; holding
/// past it fires [`InputEvent::LongPress`] once, while the button is still
/// down, and the release that follows is swallowed.
#[derive(Debug, Clone)]
pub struct GestureDetector {
    config: ButtonConfig,
    pressed: bool,
    candidate: Option<(bool, u32)>,
    pressed_at: u32,
    long_fired: bool,
}

impl GestureDetector {
    pub fn new(config: ButtonConfig) -> Self {
        Self {
            config,
            pressed: false,
            candidate: None,
            pressed_at: 0,
            long_fired: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn update(&mut self, raw_pressed: bool, now_ms: u32) -> Option<InputEvent> {
        if raw_pressed == self.pressed {
            self.candidate = None;
        } else {
            let since = match self.candidate {
                Some((level, since)) if level == raw_pressed => since,
                _ => {
                    self.candidate = Some((raw_pressed, now_ms));
                    now_ms
                }
            };

            if has_elapsed(now_ms, since, self.config.debounce_ms) {
                self.candidate = None;
                return self.settle(raw_pressed, since);
            }
        }

        if self.pressed
            && !self.long_fired
            && has_elapsed(now_ms, self.pressed_at, self.config.long_press_ms)
        {
            self.long_fired = true;
            return Some(InputEvent::LongPress);
        }

        None
    }

    fn settle(&mut self, pressed: bool, since: u32) -> Option<InputEvent> {
        self.pressed = pressed;
        if pressed {
            self.pressed_at = since;
            self.long_fired = false;
            return None;
        }

        if self.long_fired {
            self.long_fired = false;
            None
        } else {
            Some(InputEvent::ShortPress)
        }
    }
}
