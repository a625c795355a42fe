use crate::focal::{compute_highlight, HighlightRange, HighlightStrategy};
use crate::scheduler::{Phase, Scheduler};
use crate::token::Token;

/// Everything a presentation layer needs to draw the current moment
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub current_token: Token,
    pub highlight: HighlightRange,
    pub strategy: HighlightStrategy,
    pub progress_fraction: f64,
    pub estimated_minutes_remaining: u64,
    pub rate: u32,
    pub is_playing: bool,
    pub phase: Phase,
    pub cursor: usize,
    pub token_count: usize,
}

impl Snapshot {
    pub fn capture(scheduler: &Scheduler, strategy: HighlightStrategy) -> Self {
        let token = scheduler.current_token().clone();
        let cursor = scheduler.cursor();
        let token_count = scheduler.token_count();
        // tokens are never empty, the fallback only guards the type
        let highlight = compute_highlight(&token.text, strategy).unwrap_or(HighlightRange {
            span: None,
            align_index: 0,
        });

        Self {
            current_token: token,
            highlight,
            strategy,
            progress_fraction: progress_fraction(cursor, token_count),
            estimated_minutes_remaining: estimated_minutes_remaining(
                cursor,
                token_count,
                scheduler.rate(),
            ),
            rate: scheduler.rate(),
            is_playing: scheduler.is_playing(),
            phase: scheduler.phase(),
            cursor,
            token_count,
        }
    }
}

pub fn progress_fraction(cursor: usize, token_count: usize) -> f64 {
    if token_count == 0 {
        return 1.0;
    }
    ((cursor + 1) as f64 / token_count as f64).min(1.0)
}

/// Whole minutes left at `rate`, rounded up
pub fn estimated_minutes_remaining(cursor: usize, token_count: usize, rate: u32) -> u64 {
    let remaining = token_count.saturating_sub(cursor) as u64;
    remaining.div_ceil(rate.max(1) as u64)
}
