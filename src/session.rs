use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Error;
use crate::stats::StatisticsStore;

/// Final metrics handed out by the scheduler when a session ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOutcome {
    pub words_read: usize,
    pub active_duration: Duration,
    pub rate: u32,
    /// true when the reader left before the last token
    pub abandoned: bool,
}

impl SessionOutcome {
    pub fn new(
        cursor: usize,
        session_start: Instant,
        finished_at: Instant,
        accumulated_pause: Duration,
        rate: u32,
        abandoned: bool,
    ) -> Self {
        Self {
            words_read: cursor + 1,
            active_duration: active_duration(session_start, finished_at, accumulated_pause),
            rate,
            abandoned,
        }
    }

    pub fn active_duration_secs(&self) -> f64 {
        self.active_duration.as_secs_f64()
    }
}

/// Wall time between `start` and `end` minus paused time, floored at zero
pub fn active_duration(start: Instant, end: Instant, paused: Duration) -> Duration {
    end.saturating_duration_since(start).saturating_sub(paused)
}

/// One completed reading session as stored in the statistics history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSession {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub words_read: usize,
    pub active_duration_secs: f64,
    pub rate: u32,
    pub source: Option<String>,
}

impl ReadingSession {
    pub fn from_outcome(
        outcome: &SessionOutcome,
        timestamp: DateTime<Local>,
        source: Option<String>,
    ) -> Self {
        Self {
            id: timestamp.timestamp_millis(),
            timestamp,
            words_read: outcome.words_read,
            active_duration_secs: outcome.active_duration_secs(),
            rate: outcome.rate,
            source,
        }
    }

    /// Words per minute actually achieved over the active time
    pub fn effective_wpm(&self) -> f64 {
        if self.active_duration_secs > 0.0 {
            self.words_read as f64 / (self.active_duration_secs / 60.0)
        } else {
            0.0
        }
    }
}

/// Which finished sessions are worth keeping in the history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificancePolicy {
    pub min_active_secs: f64,
    pub min_words: usize,
}

impl Default for SignificancePolicy {
    fn default() -> Self {
        Self {
            min_active_secs: 10.0,
            min_words: 50,
        }
    }
}

impl SignificancePolicy {
    pub fn is_significant(&self, session: &ReadingSession) -> bool {
        session.active_duration_secs > self.min_active_secs || session.words_read > self.min_words
    }
}

/// What happened to a finished session
#[derive(Debug)]
pub enum RecordStatus {
    Recorded,
    Discarded,
    NotSaved(Error),
}

impl RecordStatus {
    pub fn label(&self) -> String {
        match self {
            RecordStatus::Recorded => "saved to history".to_string(),
            RecordStatus::Discarded => "too short to save".to_string(),
            RecordStatus::NotSaved(e) => format!("not saved: {e}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    pub policy: SignificancePolicy,
    pub source: Option<String>,
}

impl SessionRecorder {
    pub fn new(policy: SignificancePolicy, source: Option<String>) -> Self {
        Self { policy, source }
    }

    /// Turn an outcome into a session and append it to `store` when significant.
    ///
    /// A failing store never loses the session: it is returned either way so
    /// the result can still be shown.
    pub fn record(
        &self,
        outcome: &SessionOutcome,
        timestamp: DateTime<Local>,
        store: &mut dyn StatisticsStore,
    ) -> (ReadingSession, RecordStatus) {
        let session = ReadingSession::from_outcome(outcome, timestamp, self.source.clone());

        if !self.policy.is_significant(&session) {
            info!(
                words_read = session.words_read,
                active_secs = session.active_duration_secs,
                "session below significance threshold, discarded"
            );
            return (session, RecordStatus::Discarded);
        }

        let mut stats = store.load();
        stats.push(session.clone());
        let status = match store.save(&stats) {
            Ok(()) => {
                info!(
                    id = session.id,
                    words_read = session.words_read,
                    active_secs = session.active_duration_secs,
                    rate = session.rate,
                    "session recorded"
                );
                RecordStatus::Recorded
            }
            Err(e) => {
                warn!(error = %e, "failed to persist reading session");
                RecordStatus::NotSaved(e)
            }
        };

        (session, status)
    }
}
