//! Error kinds for every fallible engine operation.
//!
//! The variants map one-to-one onto failure classes rather than onto
//! components: a truncated token blob is a `Decode` whether it surfaces in
//! the query path or the precompute scan. Codec errors are recovered at the
//! scanning loops (the offending sentence is skipped and tallied); everything
//! else propagates to the caller. `IndexIo` and `Invariant` are never
//! swallowed.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong inside the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying file or mapping operation failed.
    #[error("index i/o: {0}")]
    IndexIo(#[from] io::Error),

    /// A file's magic, version, or structural invariants are violated.
    /// Fatal for the affected component; the engine refuses to open.
    #[error("index format: {0}")]
    IndexFormat(String),

    /// A codec input is truncated or malformed.
    #[error("decode: {0}")]
    Decode(String),

    /// The pattern text is ill-formed. `position` is a byte offset into the
    /// pattern source.
    #[error("pattern syntax at byte {position}: {message}")]
    PatternSyntax { position: usize, message: String },

    /// The pattern is syntactically valid but no selective candidate query
    /// can be compiled from it.
    #[error("pattern unsupported: {0}")]
    PatternUnsupported(String),

    /// A precondition known to the component was violated. Treated as a bug.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The caller requested cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for format errors built from display fragments.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::IndexFormat(msg.into())
    }

    /// Shorthand for decode errors.
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Shorthand for invariant violations.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }

    /// True when the error should be recovered at a scanning loop instead of
    /// aborting the whole operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::IndexIo(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_decode_is_recoverable() {
        assert!(Error::decode("truncated blob").is_recoverable());
        assert!(!Error::invariant("id out of range").is_recoverable());
    }

    #[test]
    fn test_pattern_syntax_reports_position() {
        let err = Error::PatternSyntax {
            position: 7,
            message: "expected ']'".into(),
        };
        assert!(err.to_string().contains("byte 7"));
    }

    #[test]
    fn test_display_carries_kind_prefix() {
        assert!(Error::format("bad magic").to_string().starts_with("index format"));
        assert_eq!(Error::Cancelled.to_string(), "cancelled");
    }
}
