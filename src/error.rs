//! # Boundary Error Codes
//!
//! BurrowDB reports failures through `eyre::Result` like the rest of the
//! crate's error handling, but the codes a caller can act on are a closed set.
//! [`ErrorCode`] is that set: it implements `std::error::Error`, travels as
//! the root cause inside an `eyre::Report`, and is recovered at boundaries
//! with [`ErrorCode::of`].
//!
//! ## Taxonomy
//!
//! - **Expected absence** (`NotFound`): key missing or iteration exhausted.
//!   Callers that expect it treat it as data, not failure.
//! - **Concurrency** (`Rollback`, `PrepareConflict`): recoverable at the
//!   transaction boundary.
//! - **Validation** (`InvalidArgument`, `DuplicateKey`): misconfigured cursor
//!   type or format, undersized block reads, bad configuration strings.
//! - **I/O** (`Io`): read failures from the underlying block file.
//! - **Data integrity** (`Corruption`): checksum or structure mismatch; the
//!   offending bytes are dumped and the connection-wide corruption latch set.
//! - **Fatal** (`Panic`): unrecoverable corruption during an ordinary read,
//!   or an illegal transaction state transition. The embedding engine treats
//!   this as the abort condition.
//!
//! ## Usage
//!
//! ```ignore
//! use burrowdb::error::ErrorCode;
//!
//! match table.get_latest(b"key") {
//!     Ok(v) => ...,
//!     Err(e) if ErrorCode::of(&e) == Some(ErrorCode::PrepareConflict) => retry(),
//!     Err(e) => return Err(e),
//! }
//! ```

use std::fmt;

/// The closed set of error codes surfaced at the crate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Key missing, cursor exhausted, or object unknown.
    NotFound,
    /// The operation conflicted with a concurrent transaction; retry it.
    Rollback,
    /// The visible candidate for a read is a prepared, uncommitted update.
    PrepareConflict,
    /// An insert collided with an existing key where overwrite is disallowed.
    DuplicateKey,
    /// Invalid configuration or an illegal argument.
    InvalidArgument,
    /// An underlying read or write failed.
    Io,
    /// Checksum or structure mismatch in on-disk data.
    Corruption,
    /// Unrecoverable failure; the engine must abort.
    Panic,
}

impl ErrorCode {
    /// Extracts the error code carried by a report, if any.
    pub fn of(err: &eyre::Report) -> Option<ErrorCode> {
        err.downcast_ref::<ErrorCode>().copied()
    }

    /// True when the report carries exactly this code.
    pub fn is(self, err: &eyre::Report) -> bool {
        Self::of(err) == Some(self)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "not found",
            ErrorCode::Rollback => "conflict with a concurrent operation",
            ErrorCode::PrepareConflict => "conflict with a prepared update",
            ErrorCode::DuplicateKey => "attempt to insert an existing key",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::Io => "I/O error",
            ErrorCode::Corruption => "data corruption detected",
            ErrorCode::Panic => "fatal error; the process must exit and restart",
        };
        f.write_str(name)
    }
}

impl std::error::Error for ErrorCode {}
