//! Failures of the broker record store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Backend failures carry the redb or serde message; record failures carry
/// the key.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("unable to open the broker database: {0}")]
    Open(String),

    #[error("database transaction failed: {0}")]
    Transaction(String),

    #[error("unable to open table: {0}")]
    Table(String),

    #[error("database read failed: {0}")]
    Read(String),

    #[error("database write failed: {0}")]
    Write(String),

    #[error("unable to encode record: {0}")]
    Serialize(String),

    #[error("unable to decode stored record: {0}")]
    Deserialize(String),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("record {0} already exists")]
    AlreadyExists(String),

    /// The stored version moved on since the caller read the record.
    #[error("record {key} was modified concurrently: stored version {stored}, update based on version {given}")]
    Conflict { key: String, stored: u64, given: u64 },
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict { .. })
    }
}
