use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::session::ReadingSession;

/// Aggregate of every recorded reading session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingStatistics {
    pub total_words: u64,
    pub total_active_secs: f64,
    pub sessions: Vec<ReadingSession>,
}

impl ReadingStatistics {
    pub fn from_sessions(sessions: Vec<ReadingSession>) -> Self {
        let mut stats = Self::default();
        for session in sessions {
            stats.push(session);
        }
        stats
    }

    pub fn push(&mut self, session: ReadingSession) {
        self.total_words += session.words_read as u64;
        self.total_active_secs += session.active_duration_secs;
        self.sessions.push(session);
    }

    /// Words per minute over all active reading time
    pub fn average_wpm(&self) -> f64 {
        if self.total_active_secs > 0.0 {
            self.total_words as f64 / (self.total_active_secs / 60.0)
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Persistence boundary for reading statistics.
///
/// `load` never fails: missing or unreadable data yields an empty aggregate.
/// `save` only ever adds sessions that are not stored yet.
pub trait StatisticsStore {
    fn load(&self) -> ReadingStatistics;
    fn save(&mut self, stats: &ReadingStatistics) -> Result<()>;
}

/// Volatile store, used in tests and when the database cannot be opened
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    stats: ReadingStatistics,
}

impl StatisticsStore for MemoryStatsStore {
    fn load(&self) -> ReadingStatistics {
        self.stats.clone()
    }

    fn save(&mut self, stats: &ReadingStatistics) -> Result<()> {
        for session in &stats.sessions {
            if !self.stats.sessions.iter().any(|s| s.id == session.id) {
                self.stats.push(session.clone());
            }
        }
        Ok(())
    }
}

/// SQLite-backed store for reading sessions
#[derive(Debug)]
pub struct SqliteStatsStore {
    conn: Connection,
}

impl SqliteStatsStore {
    /// Open (or create) the database at `path`, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_default() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("flick_stats.db"));
        Self::open(path)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS reading_sessions (
                id INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                words_read INTEGER NOT NULL,
                active_secs REAL NOT NULL,
                rate INTEGER NOT NULL,
                source TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reading_sessions_timestamp ON reading_sessions(timestamp)",
            [],
        )?;

        Ok(Self { conn })
    }

    fn query_sessions(&self) -> Result<Vec<ReadingSession>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, words_read, active_secs, rate, source
            FROM reading_sessions
            ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, timestamp, words_read, active_secs, rate, source) = row?;
            // a row with an unparseable timestamp is skipped, not fatal
            let Ok(timestamp) = DateTime::parse_from_rfc3339(&timestamp) else {
                warn!(id, "skipping reading session with invalid timestamp");
                continue;
            };
            sessions.push(ReadingSession {
                id,
                timestamp: timestamp.with_timezone(&Local),
                words_read: words_read.max(0) as usize,
                active_duration_secs: active_secs.max(0.0),
                rate: rate.clamp(0, u32::MAX as i64) as u32,
                source,
            });
        }

        Ok(sessions)
    }
}

impl StatisticsStore for SqliteStatsStore {
    fn load(&self) -> ReadingStatistics {
        match self.query_sessions() {
            Ok(sessions) => ReadingStatistics::from_sessions(sessions),
            Err(e) => {
                warn!(error = %e, "could not load reading statistics, starting empty");
                ReadingStatistics::default()
            }
        }
    }

    fn save(&mut self, stats: &ReadingStatistics) -> Result<()> {
        let tx = self.conn.transaction()?;

        let mut inserted = 0;
        for session in &stats.sessions {
            inserted += tx.execute(
                r#"
                INSERT OR IGNORE INTO reading_sessions
                (id, timestamp, words_read, active_secs, rate, source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    session.id,
                    session.timestamp.to_rfc3339(),
                    session.words_read as i64,
                    session.active_duration_secs,
                    session.rate as i64,
                    session.source,
                ],
            )?;
        }

        tx.commit()?;
        debug!(inserted, "reading statistics saved");
        Ok(())
    }
}

/// Open the on-disk store, or fall back to a volatile one if that fails.
pub fn open_store(path: Option<&Path>) -> Box<dyn StatisticsStore> {
    let opened = match path {
        Some(p) => SqliteStatsStore::open(p),
        None => SqliteStatsStore::open_default(),
    };

    match opened {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(error = %e, "statistics database unavailable, sessions will not persist");
            Box::new(MemoryStatsStore::default())
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: i64,
    timestamp: String,
    words_read: usize,
    active_secs: String,
    rate: u32,
    effective_wpm: String,
    source: &'a str,
}

/// Write every session as one CSV row, oldest first
pub fn export_csv<W: Write>(stats: &ReadingStatistics, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    for session in &stats.sessions {
        csv.serialize(CsvRow {
            id: session.id,
            timestamp: session.timestamp.to_rfc3339(),
            words_read: session.words_read,
            active_secs: format!("{:.2}", session.active_duration_secs),
            rate: session.rate,
            effective_wpm: format!("{:.1}", session.effective_wpm()),
            source: session.source.as_deref().unwrap_or(""),
        })?;
    }

    csv.flush()?;
    Ok(())
}
