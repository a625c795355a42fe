//! Playback state machine.
//!
//! The scheduler never sleeps or spawns. Every operation takes the current
//! instant and returns the timer [`Effect`]s the caller must carry out, so the
//! same code runs against the terminal clock and a virtual clock in tests.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::focal::HighlightStrategy;
use crate::pacing::{token_delay, RateBounds};
use crate::session::{active_duration, SessionOutcome};
use crate::snapshot::Snapshot;
use crate::token::Token;

/// Generation number of one armed advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Cancel(TimerId),
    Schedule { id: TimerId, delay: Duration },
    Finished(SessionOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub cursor: usize,
    pub is_playing: bool,
    pub rate: u32,
    pub session_start: Option<Instant>,
    pub accumulated_pause: Duration,
    pub pause_start: Option<Instant>,
}

impl PlaybackState {
    fn new(rate: u32) -> Self {
        Self {
            cursor: 0,
            is_playing: false,
            rate,
            session_start: None,
            accumulated_pause: Duration::ZERO,
            pause_start: None,
        }
    }
}

#[derive(Debug)]
pub struct Scheduler {
    tokens: Vec<Token>,
    state: PlaybackState,
    phase: Phase,
    bounds: RateBounds,
    pending: Option<TimerId>,
    next_timer: u64,
}

impl Scheduler {
    /// Refuses an empty token sequence so there is always a current token.
    pub fn new(tokens: Vec<Token>, rate: u32, bounds: RateBounds) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::InvalidInput(
                "cannot play an empty token sequence".to_string(),
            ));
        }

        let bounds = bounds.sanitized();
        Ok(Self {
            tokens,
            state: PlaybackState::new(bounds.clamp(rate)),
            phase: Phase::Idle,
            bounds,
            pending: None,
            next_timer: 0,
        })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bounds(&self) -> RateBounds {
        self.bounds
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn rate(&self) -> u32 {
        self.state.rate
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// The advance currently armed, if any
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending
    }

    pub fn current_token(&self) -> &Token {
        &self.tokens[self.state.cursor]
    }

    pub fn current_delay(&self) -> Duration {
        token_delay(self.current_token(), self.state.rate)
    }

    /// Active reading time so far, excluding every paused interval
    pub fn active_duration(&self, now: Instant) -> Duration {
        let Some(start) = self.state.session_start else {
            return Duration::ZERO;
        };
        let open_pause = self
            .state
            .pause_start
            .map_or(Duration::ZERO, |p| now.saturating_duration_since(p));
        active_duration(start, now, self.state.accumulated_pause + open_pause)
    }

    pub fn snapshot(&self, strategy: HighlightStrategy) -> Snapshot {
        Snapshot::capture(self, strategy)
    }

    pub fn play(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.phase {
            Phase::Playing | Phase::Finished => return effects,
            Phase::Idle => {
                self.state.session_start.get_or_insert(now);
                debug!(tokens = self.tokens.len(), rate = self.state.rate, "playback started");
            }
            Phase::Paused => {
                if let Some(paused_at) = self.state.pause_start.take() {
                    let paused_for = now.saturating_duration_since(paused_at);
                    self.state.accumulated_pause += paused_for;
                    debug!(paused_ms = paused_for.as_millis() as u64, "playback resumed");
                }
            }
        }

        self.phase = Phase::Playing;
        self.state.is_playing = true;
        self.arm(&mut effects);
        effects
    }

    pub fn pause(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase != Phase::Playing {
            return effects;
        }

        self.cancel_pending(&mut effects);
        self.phase = Phase::Paused;
        self.state.is_playing = false;
        self.state.pause_start = Some(now);
        debug!(cursor = self.state.cursor, "playback paused");
        effects
    }

    pub fn toggle(&mut self, now: Instant) -> Vec<Effect> {
        if self.state.is_playing {
            self.pause(now)
        } else {
            self.play(now)
        }
    }

    /// Handle a fired advance. Ids other than the armed one are stale and ignored.
    pub fn advance(&mut self, id: TimerId, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase != Phase::Playing || self.pending != Some(id) {
            debug!(timer = id.0, "ignoring stale advance");
            return effects;
        }
        self.pending = None;

        if self.state.cursor + 1 >= self.tokens.len() {
            self.finish(now, false, &mut effects);
        } else {
            self.state.cursor += 1;
            self.arm(&mut effects);
        }
        effects
    }

    /// Move the cursor by `delta` tokens, clamped to the sequence.
    pub fn seek(&mut self, delta: isize) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase == Phase::Finished {
            return effects;
        }

        let last = self.tokens.len() - 1;
        let target = self.state.cursor.saturating_add_signed(delta).min(last);
        if target == self.state.cursor {
            return effects;
        }

        if self.phase == Phase::Playing {
            self.cancel_pending(&mut effects);
        }
        self.state.cursor = target;
        if self.phase == Phase::Playing {
            self.arm(&mut effects);
        }
        debug!(cursor = target, delta, "seek");
        effects
    }

    /// Change the rate, clamped to the bounds. While playing, the pending
    /// advance is re-armed with the new rate straight away.
    pub fn set_rate(&mut self, wpm: u32) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase == Phase::Finished {
            return effects;
        }

        let rate = self.bounds.clamp(wpm);
        if rate == self.state.rate {
            return effects;
        }

        if self.phase == Phase::Playing {
            self.cancel_pending(&mut effects);
        }
        self.state.rate = rate;
        if self.phase == Phase::Playing {
            self.arm(&mut effects);
        }
        debug!(rate, "rate changed");
        effects
    }

    pub fn adjust_rate(&mut self, steps: i32) -> Vec<Effect> {
        let target = self.bounds.stepped(self.state.rate, steps);
        self.set_rate(target)
    }

    /// Abandon the session at the current cursor.
    ///
    /// Nothing is reported when playback never started or already finished.
    pub fn exit(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.phase {
            Phase::Playing | Phase::Paused => self.finish(now, true, &mut effects),
            Phase::Idle | Phase::Finished => self.cancel_pending(&mut effects),
        }
        effects
    }

    /// Back to an idle session at the first token, keeping the rate.
    pub fn restart(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.cancel_pending(&mut effects);
        self.state = PlaybackState::new(self.state.rate);
        self.phase = Phase::Idle;
        effects
    }

    fn finish(&mut self, now: Instant, abandoned: bool, effects: &mut Vec<Effect>) {
        self.cancel_pending(effects);

        if let Some(paused_at) = self.state.pause_start.take() {
            self.state.accumulated_pause += now.saturating_duration_since(paused_at);
        }
        self.phase = Phase::Finished;
        self.state.is_playing = false;

        let start = self.state.session_start.unwrap_or(now);
        let outcome = SessionOutcome::new(
            self.state.cursor,
            start,
            now,
            self.state.accumulated_pause,
            self.state.rate,
            abandoned,
        );
        info!(
            words_read = outcome.words_read,
            active_ms = outcome.active_duration.as_millis() as u64,
            abandoned,
            "reading session finished"
        );
        effects.push(Effect::Finished(outcome));
    }

    fn cancel_pending(&mut self, effects: &mut Vec<Effect>) {
        if let Some(id) = self.pending.take() {
            effects.push(Effect::Cancel(id));
        }
    }

    fn arm(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_pending(effects);
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.pending = Some(id);
        effects.push(Effect::Schedule {
            id,
            delay: self.current_delay(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;
    use assert_matches::assert_matches;

    fn scheduler(text: &str, rate: u32) -> Scheduler {
        Scheduler::new(tokenize(text).unwrap(), rate, RateBounds::default()).unwrap()
    }

    fn scheduled(effects: &[Effect]) -> Option<(TimerId, Duration)> {
        effects.iter().find_map(|e| match e {
            Effect::Schedule { id, delay } => Some((*id, *delay)),
            _ => None,
        })
    }

    fn outcome(effects: &[Effect]) -> Option<SessionOutcome> {
        effects.iter().find_map(|e| match e {
            Effect::Finished(o) => Some(*o),
            _ => None,
        })
    }

    #[test]
    fn test_new_rejects_empty_sequence() {
        assert_matches!(
            Scheduler::new(Vec::new(), 300, RateBounds::default()),
            Err(Error::InvalidInput(_))
        );
    }

    #[test]
    fn test_new_clamps_rate() {
        let s = scheduler("one two", 5000);
        assert_eq!(s.rate(), 2000);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.is_playing());
    }

    #[test]
    fn test_play_from_idle_schedules_current_token() {
        let mut s = scheduler("one two", 600);
        let t0 = Instant::now();

        let effects = s.play(t0);

        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.state().session_start, Some(t0));
        let (id, delay) = scheduled(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(100));
        assert_eq!(s.pending_timer(), Some(id));
    }

    #[test]
    fn test_play_while_playing_is_noop() {
        let mut s = scheduler("one two", 600);
        let t0 = Instant::now();
        s.play(t0);
        let pending = s.pending_timer();

        assert!(s.play(t0 + Duration::from_millis(50)).is_empty());
        assert_eq!(s.pending_timer(), pending);
    }

    #[test]
    fn test_advance_moves_cursor_and_rearms() {
        let mut s = scheduler("one two. three", 600);
        let t0 = Instant::now();
        let (id, _) = scheduled(&s.play(t0)).unwrap();

        let effects = s.advance(id, t0 + Duration::from_millis(100));

        assert_eq!(s.cursor(), 1);
        let (next, delay) = scheduled(&effects).unwrap();
        assert_ne!(next, id);
        assert_eq!(delay, Duration::from_millis(150));
    }

    #[test]
    fn test_advance_on_last_token_finishes() {
        let mut s = scheduler("one two", 600);
        let t0 = Instant::now();
        let (id, _) = scheduled(&s.play(t0)).unwrap();
        let (id, _) = scheduled(&s.advance(id, t0 + Duration::from_millis(100))).unwrap();

        let effects = s.advance(id, t0 + Duration::from_millis(200));

        assert!(s.is_finished());
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.pending_timer(), None);
        let outcome = outcome(&effects).unwrap();
        assert_eq!(outcome.words_read, 2);
        assert_eq!(outcome.active_duration, Duration::from_millis(200));
        assert!(!outcome.abandoned);
    }

    #[test]
    fn test_stale_advance_ignored() {
        let mut s = scheduler("one two three", 600);
        let t0 = Instant::now();
        let (first, _) = scheduled(&s.play(t0)).unwrap();
        s.pause(t0 + Duration::from_millis(50));

        assert!(s.advance(first, t0 + Duration::from_millis(100)).is_empty());
        assert_eq!(s.cursor(), 0);

        s.play(t0 + Duration::from_millis(200));
        assert!(s.advance(first, t0 + Duration::from_millis(250)).is_empty());
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn test_pause_cancels_and_records_start() {
        let mut s = scheduler("one two", 600);
        let t0 = Instant::now();
        let (id, _) = scheduled(&s.play(t0)).unwrap();

        let effects = s.pause(t0 + Duration::from_millis(40));

        assert_eq!(effects, vec![Effect::Cancel(id)]);
        assert_eq!(s.phase(), Phase::Paused);
        assert_eq!(s.state().pause_start, Some(t0 + Duration::from_millis(40)));
        assert_eq!(s.pending_timer(), None);
    }

    #[test]
    fn test_pause_twice_is_idempotent() {
        let mut s = scheduler("one two", 600);
        let t0 = Instant::now();
        s.play(t0);
        s.pause(t0 + Duration::from_millis(10));
        let before = s.state().clone();

        assert!(s.pause(t0 + Duration::from_millis(500)).is_empty());
        assert_eq!(s.state(), &before);
        assert_eq!(s.phase(), Phase::Paused);
    }

    #[test]
    fn test_pause_when_idle_is_noop() {
        let mut s = scheduler("one two", 600);
        assert!(s.pause(Instant::now()).is_empty());
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.state().pause_start, None);
    }

    #[test]
    fn test_resume_accumulates_pause_and_restarts_delay() {
        let mut s = scheduler("one two three", 600);
        let t0 = Instant::now();
        s.play(t0);
        s.pause(t0 + Duration::from_millis(70));

        let effects = s.play(t0 + Duration::from_millis(1070));

        assert_eq!(s.state().accumulated_pause, Duration::from_secs(1));
        assert_eq!(s.state().pause_start, None);
        assert_eq!(s.state().session_start, Some(t0));
        assert_eq!(s.cursor(), 0);
        let (_, delay) = scheduled(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn test_active_duration_excludes_open_pause() {
        let mut s = scheduler("one two three", 600);
        let t0 = Instant::now();
        assert_eq!(s.active_duration(t0), Duration::ZERO);

        s.play(t0);
        s.pause(t0 + Duration::from_millis(80));

        assert_eq!(
            s.active_duration(t0 + Duration::from_secs(5)),
            Duration::from_millis(80)
        );
    }

    #[test]
    fn test_seek_clamps_cursor() {
        let mut s = scheduler("a b c d e", 600);
        s.seek(10);
        assert_eq!(s.cursor(), 4);
        s.seek(-2);
        assert_eq!(s.cursor(), 2);
        s.seek(-10);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_seek_while_playing_rearms_once() {
        let mut s = scheduler("a b c d e f g h i j k l", 600);
        let t0 = Instant::now();
        let (first, _) = scheduled(&s.play(t0)).unwrap();

        let effects = s.seek(5);

        assert_eq!(effects[0], Effect::Cancel(first));
        let (second, _) = scheduled(&effects).unwrap();
        assert_eq!(s.cursor(), 5);

        // the cancelled advance fires late and must not move the cursor
        assert!(s.advance(first, t0 + Duration::from_millis(100)).is_empty());
        assert_eq!(s.cursor(), 5);

        s.advance(second, t0 + Duration::from_millis(200));
        assert_eq!(s.cursor(), 6);
    }

    #[test]
    fn test_seek_while_paused_keeps_phase() {
        let mut s = scheduler("a b c d e", 600);
        let t0 = Instant::now();
        s.play(t0);
        s.pause(t0);

        let effects = s.seek(2);

        assert!(effects.is_empty());
        assert_eq!(s.cursor(), 2);
        assert_eq!(s.phase(), Phase::Paused);
    }

    #[test]
    fn test_set_rate_clamps_and_rearms_while_playing() {
        let mut s = scheduler("one two", 300);
        let t0 = Instant::now();
        let (first, _) = scheduled(&s.play(t0)).unwrap();

        let effects = s.set_rate(50);

        assert_eq!(s.rate(), 100);
        assert_eq!(effects[0], Effect::Cancel(first));
        let (_, delay) = scheduled(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(600));
    }

    #[test]
    fn test_set_rate_while_paused_only_updates_rate() {
        let mut s = scheduler("one two", 300);
        let t0 = Instant::now();
        s.play(t0);
        s.pause(t0);

        assert!(s.set_rate(600).is_empty());
        assert_eq!(s.rate(), 600);
        let (_, delay) = scheduled(&s.play(t0 + Duration::from_secs(1))).unwrap();
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn test_adjust_rate_steps() {
        let mut s = scheduler("one two", 300);
        s.adjust_rate(1);
        assert_eq!(s.rate(), 350);
        s.adjust_rate(-10);
        assert_eq!(s.rate(), 100);
    }

    #[test]
    fn test_exit_abandons_at_cursor() {
        let mut s = scheduler("a b c d e", 600);
        let t0 = Instant::now();
        s.play(t0);
        s.seek(2);
        s.pause(t0 + Duration::from_secs(2));

        let effects = s.exit(t0 + Duration::from_secs(5));

        let outcome = outcome(&effects).unwrap();
        assert!(outcome.abandoned);
        assert_eq!(outcome.words_read, 3);
        assert_eq!(outcome.active_duration, Duration::from_secs(2));
        assert!(s.is_finished());
    }

    #[test]
    fn test_exit_before_play_reports_nothing() {
        let mut s = scheduler("a b", 600);
        assert!(s.exit(Instant::now()).is_empty());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_finished_is_terminal() {
        let mut s = scheduler("only", 600);
        let t0 = Instant::now();
        let (id, _) = scheduled(&s.play(t0)).unwrap();
        assert!(outcome(&s.advance(id, t0 + Duration::from_millis(100))).is_some());

        assert!(s.play(t0).is_empty());
        assert!(s.pause(t0).is_empty());
        assert!(s.seek(-1).is_empty());
        assert!(s.set_rate(900).is_empty());
        assert!(s.exit(t0).is_empty());
        assert!(s.advance(id, t0).is_empty());
        assert!(s.is_finished());
    }

    #[test]
    fn test_restart_returns_to_idle() {
        let mut s = scheduler("a b c", 450);
        let t0 = Instant::now();
        let (id, _) = scheduled(&s.play(t0)).unwrap();
        s.seek(2);

        let effects = s.restart();

        assert!(effects.iter().all(|e| matches!(e, Effect::Cancel(_))));
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.rate(), 450);
        assert_eq!(s.state().session_start, None);
        assert!(s.advance(id, t0).is_empty());
    }

    #[test]
    fn test_at_most_one_pending_advance() {
        let mut s = scheduler("a b c d e f g h", 600);
        let t0 = Instant::now();
        let mut armed: Vec<TimerId> = Vec::new();

        let apply = |effects: Vec<Effect>, armed: &mut Vec<TimerId>| {
            for effect in effects {
                match effect {
                    Effect::Cancel(id) => armed.retain(|a| *a != id),
                    Effect::Schedule { id, .. } => armed.push(id),
                    Effect::Finished(_) => {}
                }
            }
            assert!(armed.len() <= 1);
        };

        apply(s.play(t0), &mut armed);
        apply(s.seek(3), &mut armed);
        apply(s.set_rate(900), &mut armed);
        apply(s.seek(-1), &mut armed);
        apply(s.pause(t0), &mut armed);
        apply(s.play(t0), &mut armed);
        apply(s.toggle(t0), &mut armed);
        apply(s.toggle(t0), &mut armed);
        assert_eq!(armed.len(), 1);
        assert_eq!(s.pending_timer(), armed.first().copied());
    }
}
