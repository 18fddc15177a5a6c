//! The error taxonomy shared by every stream in the engine.
//!
//! Errors abort the consuming stream immediately; there is no local
//! recovery. Operators that own disk state (the external sort) release it
//! before an error reaches the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A boxed error from user-supplied code, passed through unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Anything that can go wrong while composing or running a graph.
#[derive(Debug, Error)]
pub enum Error {
    /// A source node named a supplier that `run` was not given.
    #[error("no source named `{0}` was supplied to run")]
    MissingSource(String),

    /// A file-backed source failed to open or read.
    #[error("reading {}", .path.display())]
    SourceIo {
        /// Path of the file being read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A line of a file-backed source did not parse into a row.
    #[error("parsing line {} of {}", .line, .path.display())]
    SourceParse {
        /// Path of the file being read.
        path: PathBuf,
        /// One-based line number of the offending line.
        line: u64,
        /// The parser's own error.
        #[source]
        source: BoxError,
    },

    /// A grouping consumer observed a decreasing key transition.
    #[error("stream is not sorted by [{}]", .keys.join(", "))]
    UnsortedInput {
        /// The key tuple the stream was expected to be sorted by.
        keys: Vec<String>,
    },

    /// Division by zero, logarithm of a non-positive value, overflow.
    #[error("{0}")]
    Arithmetic(String),

    /// The external sort failed to spill or merge a run.
    #[error("external sort spill")]
    SpillIo(#[source] io::Error),

    /// An operation referenced a column the row does not have.
    #[error("row has no column `{0}`")]
    MissingColumn(String),

    /// A column held a value of the wrong kind for the operation.
    #[error("column `{column}` holds {found}, expected {expected}")]
    Type {
        /// The column that was read.
        column: String,
        /// What the operation needed.
        expected: &'static str,
        /// What the row actually held.
        found: &'static str,
    },

    /// Any other failure raised by user-supplied operation logic.
    #[error("{0}")]
    Other(BoxError),
}

impl Error {
    /// Wraps a plain message as a pass-through user error.
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other(message.into().into())
    }
}

impl From<BoxError> for Error {
    fn from(error: BoxError) -> Self {
        Error::Other(error)
    }
}
