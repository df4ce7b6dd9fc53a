//! Error types for the genome engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenomeError>;

/// Failures surfaced by the genome codec.
///
/// Mutation operators never produce these on their own account: an operator
/// that finds nothing to mutate returns its input unchanged. A decode
/// failure always indicates corrupted genome data and is propagated to the
/// caller rather than papered over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenomeError {
    #[error("genome data ends early at byte {0}")]
    UnexpectedEnd(usize),

    #[error("unknown cell function tag {tag} at byte {offset}")]
    UnknownFunctionTag { tag: u8, offset: usize },

    #[error("nested genome length {len} overruns the enclosing buffer at byte {offset}")]
    LengthOverrun { len: usize, offset: usize },

    #[error("genome nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}
