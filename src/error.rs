/*!
 * Error and Result types for log compaction.
 *
 * Every failure here is fatal to the run: the tool either produces a
 * complete output buffer or nothing at all. `EmptyOutput` is the one
 * user-facing case where the input was structurally valid but there was
 * nothing to write.
 */

use std::collections::TryReserveError;
use thiserror::Error;

/// A convenience `Result` type for compaction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for decoding, aggregation and buffer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Top-level value did not start with the `*` array marker.
    #[error("protocol error: expected array marker '*', got {0:#04x}")]
    ExpectedArray(u8),

    /// Array element did not start with the `$` bulk string marker.
    #[error("protocol error: expected bulk marker '$', got {0:#04x}")]
    ExpectedBulk(u8),

    /// Array element count was zero or negative.
    #[error("protocol error: invalid array element count {0}")]
    BadArrayLen(i64),

    /// Bulk string declared a negative byte length.
    #[error("protocol error: invalid bulk length {0}")]
    BadBulkLen(i64),

    /// A length prefix was not a decimal number terminated by CRLF.
    #[error("protocol error: malformed length line")]
    ExpectedCrlf,

    /// A declared length does not fit in the frame arithmetic.
    #[error("protocol error: declared length overflow")]
    LengthOverflow,

    /// A ZINCRBY score argument failed to parse as a float.
    #[error("invalid ZINCRBY score {0:?}")]
    BadScore(String),

    /// A table or buffer allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// Aggregation finished without producing a single command.
    #[error("aggregation produced no commands")]
    EmptyOutput,
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
