use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::focal::HighlightStrategy;
use crate::runtime::AdvanceTimer;
use crate::scheduler::{Effect, Scheduler};
use crate::session::{ReadingSession, RecordStatus, SessionOutcome, SessionRecorder};
use crate::snapshot::Snapshot;
use crate::stats::{ReadingStatistics, StatisticsStore};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Reading,
    Results,
    History,
}

#[derive(Debug, Default)]
pub struct HistoryState {
    pub scroll_offset: usize,
}

/// What the results screen shows about the session that just ended
#[derive(Debug)]
pub struct SessionSummary {
    pub session: ReadingSession,
    pub status: RecordStatus,
    pub abandoned: bool,
    pub token_count: usize,
}

pub struct App {
    pub config: Config,
    pub scheduler: Scheduler,
    pub strategy: HighlightStrategy,
    pub state: AppState,
    pub history_state: HistoryState,
    pub history: ReadingStatistics,
    pub summary: Option<SessionSummary>,
    pub should_quit: bool,
    timer: AdvanceTimer,
    recorder: SessionRecorder,
    store: Box<dyn StatisticsStore>,
}

impl App {
    pub fn new(
        tokens: Vec<Token>,
        config: Config,
        store: Box<dyn StatisticsStore>,
        source: Option<String>,
    ) -> Result<Self> {
        let scheduler = Scheduler::new(tokens, config.wpm, config.rate_bounds)?;
        let recorder = SessionRecorder::new(config.significance, source);

        Ok(Self {
            strategy: config.strategy,
            config,
            scheduler,
            state: AppState::Reading,
            history_state: HistoryState::default(),
            history: ReadingStatistics::default(),
            summary: None,
            should_quit: false,
            timer: AdvanceTimer::new(),
            recorder,
            store,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.scheduler.snapshot(self.strategy)
    }

    /// How long the event loop may wait before the next advance is due
    pub fn wait_time(&self, now: Instant, limit: Duration) -> Duration {
        self.timer.wait_time(now, limit)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Fire the pending advance if its deadline has passed
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(id) = self.timer.take_due(now) {
            let effects = self.scheduler.advance(id, now);
            self.handle(effects, now);
        }
    }

    pub fn on_key(&mut self, key: KeyEvent, now: Instant) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            match self.state {
                AppState::Reading => self.exit(now),
                AppState::Results | AppState::History => self.should_quit = true,
            }
            return;
        }

        match self.state {
            AppState::Reading => self.on_reading_key(key, now),
            AppState::Results => match key.code {
                KeyCode::Char('r') => self.restart(),
                KeyCode::Char('s') => self.open_history(),
                KeyCode::Esc | KeyCode::Char('q') => self.should_quit = true,
                _ => {}
            },
            AppState::History => self.on_history_key(key),
        }
    }

    fn on_reading_key(&mut self, key: KeyEvent, now: Instant) {
        let jump = self.config.seek_jump as isize;
        let step = self.config.seek_step as isize;

        let effects = match key.code {
            KeyCode::Char(' ') => self.scheduler.toggle(now),
            KeyCode::Up | KeyCode::Char('+') | KeyCode::Char('=') => self.scheduler.adjust_rate(1),
            KeyCode::Down | KeyCode::Char('-') => self.scheduler.adjust_rate(-1),
            KeyCode::Left => self.scheduler.seek(-jump),
            KeyCode::Right => self.scheduler.seek(jump),
            KeyCode::Char('h') | KeyCode::Char(',') => self.scheduler.seek(-step),
            KeyCode::Char('l') | KeyCode::Char('.') => self.scheduler.seek(step),
            KeyCode::Tab => {
                self.strategy = self.strategy.next();
                debug!(strategy = %self.strategy, "highlight strategy changed");
                return;
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                self.exit(now);
                return;
            }
            _ => return,
        };

        self.handle(effects, now);
    }

    fn on_history_key(&mut self, key: KeyEvent) {
        let last_row = self.history.sessions.len().saturating_sub(1);
        let scroll = &mut self.history_state.scroll_offset;

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => *scroll = scroll.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => *scroll = (*scroll + 1).min(last_row),
            KeyCode::PageUp => *scroll = scroll.saturating_sub(10),
            KeyCode::PageDown => *scroll = (*scroll + 10).min(last_row),
            KeyCode::Home => *scroll = 0,
            KeyCode::End => *scroll = last_row,
            KeyCode::Char('b') | KeyCode::Backspace | KeyCode::Esc => self.state = AppState::Results,
            KeyCode::Char('r') => self.restart(),
            KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
    }

    /// Leave the reading screen. Quits outright when nothing was read yet.
    pub fn exit(&mut self, now: Instant) {
        let effects = self.scheduler.exit(now);
        self.handle(effects, now);
        if self.state == AppState::Reading {
            self.should_quit = true;
        }
    }

    /// Read the same text again from the first word
    pub fn restart(&mut self) {
        self.scheduler.restart();
        self.timer.clear();
        self.summary = None;
        self.state = AppState::Reading;
        info!(tokens = self.scheduler.token_count(), "reading again");
    }

    pub fn open_history(&mut self) {
        self.history = self.store.load();
        self.history_state = HistoryState::default();
        self.state = AppState::History;
    }

    fn handle(&mut self, effects: Vec<Effect>, now: Instant) {
        if let Some(outcome) = self.timer.apply(effects, now) {
            self.finish(outcome);
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        let (session, status) = self
            .recorder
            .record(&outcome, Local::now(), self.store.as_mut());

        self.summary = Some(SessionSummary {
            session,
            status,
            abandoned: outcome.abandoned,
            token_count: self.scheduler.token_count(),
        });
        self.state = AppState::Results;
    }
}
