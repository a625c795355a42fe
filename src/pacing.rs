use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::Token;

pub const DEFAULT_WPM: u32 = 300;
pub const MIN_WPM: u32 = 100;
pub const MAX_WPM: u32 = 2000;
pub const RATE_STEP: u32 = 50;

pub const PUNCTUATION_MULTIPLIER: f64 = 1.5;
pub const LONG_WORD_MULTIPLIER: f64 = 1.3;
/// Words longer than this many chars get the long word multiplier
pub const LONG_WORD_THRESHOLD: usize = 10;

/// Inclusive words-per-minute bounds and the step used by speed controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBounds {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl Default for RateBounds {
    fn default() -> Self {
        Self {
            min: MIN_WPM,
            max: MAX_WPM,
            step: RATE_STEP,
        }
    }
}

impl RateBounds {
    /// Bounds with `min <= max` and a non-zero floor, whatever was configured
    pub fn sanitized(self) -> Self {
        let min = self.min.max(1);
        Self {
            min,
            max: self.max.max(min),
            step: self.step.max(1),
        }
    }

    pub fn clamp(&self, wpm: u32) -> u32 {
        wpm.clamp(self.min, self.max)
    }

    /// Rate after moving `steps` increments away from `wpm`, clamped
    pub fn stepped(&self, wpm: u32, steps: i32) -> u32 {
        let target = wpm as i64 + steps as i64 * self.step as i64;
        self.clamp(target.clamp(0, u32::MAX as i64) as u32)
    }
}

/// Milliseconds one plain word stays on screen at `wpm`
pub fn base_delay_ms(wpm: u32) -> f64 {
    60_000.0 / wpm.max(1) as f64
}

/// The single multiplier that applies to a token; punctuation wins over length
pub fn delay_multiplier(token: &Token) -> f64 {
    if token.has_trailing_punctuation {
        PUNCTUATION_MULTIPLIER
    } else if token.char_len() > LONG_WORD_THRESHOLD {
        LONG_WORD_MULTIPLIER
    } else {
        1.0
    }
}

/// How long `token` is presented before the scheduler advances
pub fn token_delay(token: &Token, wpm: u32) -> Duration {
    let nanos = base_delay_ms(wpm) * delay_multiplier(token) * 1_000_000.0;
    Duration::from_nanos(nanos.round() as u64)
}
