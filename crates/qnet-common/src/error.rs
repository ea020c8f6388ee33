//! Crate-level error type.
//!
//! Steady-state evaluation never fails; errors exist only at the edges
//! (loading configuration, talking to a runtime that has shut down).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QnsError {
    /// Configuration could not be parsed or contained an invalid entry.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An unknown policy condition token was encountered while building the
    /// selection-policy table.
    #[error("unknown policy condition token: {0}")]
    PolicyToken(String),

    /// Event posted to an evaluator runtime that has already shut down.
    #[error("evaluator runtime is closed")]
    RuntimeClosed,
}
