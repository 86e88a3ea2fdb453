//! Public error taxonomy of the engine.

use memtable::MemtableError;
use sstable::SstError;
use std::io;
use thiserror::Error;
use wal::WalError;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a caller of the engine can observe.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation attempted on a closed database.
    #[error("siltkv: database is closed")]
    Closed,

    /// Malformed input: empty directory path, or a key/value over its bound.
    #[error("siltkv: invalid argument: {0}")]
    InvalidArgument(String),

    /// Write attempted on a frozen memtable. Internal to rotation; a client
    /// only sees this if a rotation was left half-done by an earlier error.
    #[error("siltkv: memtable is frozen")]
    Frozen,

    /// Structural damage in an on-disk artifact.
    #[error("siltkv: corruption: {0}")]
    Corruption(String),

    /// Any filesystem error, including latched background failures.
    #[error("siltkv: io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wraps a latched background-flush failure for surfacing on writes.
    pub(crate) fn background(msg: &str) -> Self {
        Error::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("background flush failed: {}", msg),
        ))
    }
}

impl From<WalError> for Error {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Closed => Error::Closed,
            WalError::InvalidSize => {
                Error::InvalidArgument("key or value exceeds size bounds".into())
            }
            WalError::Io(e) => Error::Io(e),
        }
    }
}

impl From<MemtableError> for Error {
    fn from(e: MemtableError) -> Self {
        match e {
            MemtableError::Frozen => Error::Frozen,
            MemtableError::Wal(e) => e.into(),
        }
    }
}

impl From<SstError> for Error {
    fn from(e: SstError) -> Self {
        match e {
            SstError::Corruption(msg) => Error::Corruption(msg),
            SstError::Io(e) => Error::Io(e),
        }
    }
}
