//! Failures of the run database.
//!
//! Backend failures carry redb's rendered message, since redb spreads them
//! over many error types. A bad deployment or run ID is `InvalidKey`; the
//! API answers it with 400 and everything else with 500.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    /// The database file could not be created, opened, or locked.
    #[error("cannot open run database: {0}")]
    Open(String),

    #[error("run database transaction failed: {0}")]
    Transaction(String),

    #[error("runs table unavailable: {0}")]
    Table(String),

    #[error("failed to read runs: {0}")]
    Read(String),

    #[error("failed to write run: {0}")]
    Write(String),

    #[error("failed to encode run record: {0}")]
    Encode(String),

    /// A stored value no longer matches `RunRecord`.
    #[error("corrupt run record: {0}")]
    Decode(String),

    /// Deployment or run ID unusable as a key segment.
    #[error("invalid run key: {0}")]
    InvalidKey(String),
}
