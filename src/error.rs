//! Error types for flick operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, presenting or recording a reading session.
#[derive(Error, Debug)]
pub enum Error {
    #[error("nothing to read: input contains no words")]
    EmptyInput,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("could not read {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("statistics store error: {0}")]
    Persistence(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn extraction(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
