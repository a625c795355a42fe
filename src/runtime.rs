use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};
use tracing::debug;

use crate::scheduler::{Effect, TimerId};
use crate::session::SessionOutcome;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ReaderEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait ReaderEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<ReaderEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // key release/repeat reports would double every press on some terminals
                Ok(CtEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                    Some(ReaderEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => Some(ReaderEvent::Resize),
                Ok(_) => None,
                Err(_) => break,
            };
            if let Some(ev) = forwarded {
                if tx.send(ev).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Channel-fed event source for headless runs
pub struct TestEventSource {
    rx: Receiver<ReaderEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }
}

impl ReaderEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Source of "now" for the scheduler
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Jump to `at`; the clock never goes backwards
    pub fn set(&self, at: Instant) {
        if at > self.now.get() {
            self.now.set(at);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Holds the single armed advance as an absolute deadline.
///
/// Feeds on the scheduler's effects: `Schedule` replaces the deadline,
/// `Cancel` clears it only when the ids match.
#[derive(Debug, Default)]
pub struct AdvanceTimer {
    pending: Option<(TimerId, Instant)>,
}

impl AdvanceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carry out `effects`, returning the outcome if the session finished
    pub fn apply(&mut self, effects: Vec<Effect>, now: Instant) -> Option<SessionOutcome> {
        let mut finished = None;
        for effect in effects {
            match effect {
                Effect::Cancel(id) => {
                    if self.pending.is_some_and(|(armed, _)| armed == id) {
                        self.pending = None;
                    }
                }
                Effect::Schedule { id, delay } => {
                    self.pending = Some((id, now + delay));
                }
                Effect::Finished(outcome) => finished = Some(outcome),
            }
        }
        finished
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, due)| due)
    }

    /// Disarm and return the advance whose deadline has passed
    pub fn take_due(&mut self, now: Instant) -> Option<TimerId> {
        match self.pending {
            Some((id, due)) if due <= now => {
                self.pending = None;
                debug!(timer = id.0, late_us = now.duration_since(due).as_micros() as u64, "advance due");
                Some(id)
            }
            _ => None,
        }
    }

    /// How long the event loop may block: `limit`, or less if an advance is due sooner
    pub fn wait_time(&self, now: Instant, limit: Duration) -> Duration {
        match self.deadline() {
            Some(due) => due.saturating_duration_since(now).min(limit),
            None => limit,
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: ReaderEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: ReaderEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn interval(&self) -> Duration {
        self.ticker.interval()
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> ReaderEvent {
        self.step_within(self.ticker.interval())
    }

    /// Like [`Runner::step`] but never blocks longer than `limit`
    pub fn step_within(&self, limit: Duration) -> ReaderEvent {
        match self.event_source.recv_timeout(limit.min(self.ticker.interval())) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                ReaderEvent::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        assert_matches!(runner.step(), ReaderEvent::Tick);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(ReaderEvent::Resize).unwrap();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(10));
        let runner = Runner::new(es, ticker);

        assert_matches!(runner.step(), ReaderEvent::Resize);
    }

    #[test]
    fn step_within_caps_at_the_tick_interval() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(5)));

        let started = Instant::now();
        assert_matches!(runner.step_within(Duration::from_secs(30)), ReaderEvent::Tick);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn manual_clock_moves_only_forward() {
        let start = Instant::now();
        let clock = ManualClock::starting_at(start);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), start + Duration::from_millis(250));

        clock.set(start);
        assert_eq!(clock.now(), start + Duration::from_millis(250));
    }

    #[test]
    fn timer_tracks_the_latest_schedule() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();

        let finished = timer.apply(
            vec![Effect::Schedule {
                id: TimerId(1),
                delay: Duration::from_millis(200),
            }],
            now,
        );
        assert!(finished.is_none());
        assert_eq!(timer.deadline(), Some(now + Duration::from_millis(200)));

        timer.apply(
            vec![
                Effect::Cancel(TimerId(1)),
                Effect::Schedule {
                    id: TimerId(2),
                    delay: Duration::from_millis(50),
                },
            ],
            now,
        );
        assert_eq!(timer.deadline(), Some(now + Duration::from_millis(50)));
    }

    #[test]
    fn timer_ignores_cancel_for_other_ids() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();
        timer.apply(
            vec![Effect::Schedule {
                id: TimerId(3),
                delay: Duration::from_millis(10),
            }],
            now,
        );

        timer.apply(vec![Effect::Cancel(TimerId(2))], now);
        assert!(timer.deadline().is_some());
    }

    #[test]
    fn take_due_fires_once() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();
        timer.apply(
            vec![Effect::Schedule {
                id: TimerId(7),
                delay: Duration::from_millis(100),
            }],
            now,
        );

        assert_eq!(timer.take_due(now + Duration::from_millis(99)), None);
        assert_eq!(timer.take_due(now + Duration::from_millis(100)), Some(TimerId(7)));
        assert_eq!(timer.take_due(now + Duration::from_millis(500)), None);
    }

    #[test]
    fn wait_time_is_bounded_by_deadline() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();
        let tick = Duration::from_millis(100);
        assert_eq!(timer.wait_time(now, tick), tick);

        timer.apply(
            vec![Effect::Schedule {
                id: TimerId(1),
                delay: Duration::from_millis(30),
            }],
            now,
        );
        assert_eq!(timer.wait_time(now, tick), Duration::from_millis(30));
        assert_eq!(timer.wait_time(now + Duration::from_secs(1), tick), Duration::ZERO);
    }

    #[test]
    fn finished_effect_is_returned() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();
        let outcome = SessionOutcome::new(4, now, now + Duration::from_secs(2), Duration::ZERO, 300, false);

        let finished = timer.apply(vec![Effect::Cancel(TimerId(9)), Effect::Finished(outcome)], now);
        assert_eq!(finished, Some(outcome));
        assert_eq!(timer.deadline(), None);
    }
}
