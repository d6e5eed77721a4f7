//! Error types for meshscan

use thiserror::Error;

/// Main error type for meshscan operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected input: empty point set, degenerate crop box, out-of-volume point
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Zero total kernel weight where a defined value was required
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Per-cell least-squares solve did not produce a usable vertex
    #[error("Solver failure: {0}")]
    SolverFailure(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for meshscan operations
pub type Result<T> = std::result::Result<T, Error>;
