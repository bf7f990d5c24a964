//! Structured, recoverable errors this crate can return (§7).
//!
//! Invariant violations inside an already-constructed `Module` are not
//! modeled here — those are programmer errors (a pass produced a broken
//! graph) and `validate`/the arena accessors panic on them instead, per
//! §7's "corruption is a bug, not a `Result`" policy. What lives in this
//! file is for input a caller doesn't control: hand-written textual IR and
//! hand-written pipeline specifications, both of which can simply be wrong.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
#[error("{pos}: {message}")]
pub struct TextParseError {
    pub pos: Position,
    pub message: String,
}

impl TextParseError {
    pub fn new(pos: Position, message: impl Into<String>) -> Self {
        Self { pos, message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Parse(#[from] TextParseError),
    #[error("unknown pass name '{0}'")]
    UnknownPass(String),
    #[error("pass '{pass}' rejected argument '{arg}': {reason}")]
    BadArgument { pass: String, arg: String, reason: String },
    #[error("pass '{0}' does not accept a nested pipeline")]
    UnexpectedNesting(String),
}
