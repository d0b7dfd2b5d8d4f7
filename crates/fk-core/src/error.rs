//! Error types for the engine.

use thiserror::Error;

/// Errors surfaced to the caller at construction or load time.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A file could not be opened or read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine or storage was constructed with inconsistent options.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// A single rule failed to parse.
///
/// The scanner absorbs these: the offending line is logged and skipped,
/// scanning continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse rule \"{line}\": {reason}")]
pub struct RuleSyntaxError {
    pub line: String,
    pub reason: String,
}

impl RuleSyntaxError {
    pub fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
