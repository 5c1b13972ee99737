//! Unified error types for the GAT ecosystem
//!
//! This module provides a common error type [`GatError`] that can represent
//! errors from any part of the system. Domain-specific error types can be
//! converted to `GatError` for uniform error handling at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use gat_core::{GatError, GatResult};
//!
//! fn process_network(path: &str) -> GatResult<()> {
//!     let network = load_network(path)?;
//!     solve_opf(&network)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::ids::ID;

/// Unified error type for all GAT operations.
///
/// This enum provides a common error representation for the GAT ecosystem,
/// allowing errors from I/O, parsing, solving, and validation to be handled
/// uniformly.
#[derive(Error, Debug)]
pub enum GatError {
    /// I/O errors (file access, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Two components were emplaced with the same caller-assigned ID.
    #[error("conflicting id: {0}")]
    ConflictId(ID),

    /// No component in the store carries this ID.
    #[error("id not found: {0}")]
    IdNotFound(ID),

    /// The ID exists but names a component of a different kind than expected.
    #[error("id {0} has the wrong component type")]
    IdWrongType(ID),

    /// A branch references an endpoint node that does not exist, or a
    /// from/to pairing that does not form a valid branch.
    #[error("invalid branch {0}: {1}")]
    InvalidBranch(ID, String),

    /// A sensor's `measured_object` does not point at a component compatible
    /// with its `measured_terminal_type`.
    #[error("invalid measured object for sensor {0}: {1}")]
    InvalidMeasuredObject(ID, String),

    /// A tap regulator's `regulated_object` is not a component that can be
    /// regulated, or does not match the regulator's control mode.
    #[error("invalid regulated object for regulator {0}: {1}")]
    InvalidRegulatedObject(ID, String),

    /// Automatic tap changer calculation could not converge or has
    /// inconsistent bounds.
    #[error("automatic tap calculation failed for {0}: {1}")]
    AutomaticTapCalculationError(ID, String),

    /// Two tap regulators claim the same regulated object.
    #[error("object {0} is regulated by more than one tap regulator")]
    DuplicativelyRegulatedObject(ID),

    /// An exhaustive match over a component/calculation enum hit a case the
    /// implementation does not (yet) handle.
    #[error("missing case for enum value: {0}")]
    MissingCaseForEnum(String),

    /// The Y-bus (or derived admittance) matrix is singular or otherwise
    /// cannot be factorized.
    #[error("sparse matrix error: {0}")]
    SparseMatrixError(String),

    /// An island has fewer independent measurements than states to solve
    /// for.
    #[error("system not observable: {0}")]
    NotObservableError(String),

    /// A dataset violates shape/attribute invariants (ragged vs. uniform,
    /// unknown required attribute, wrong dtype, ...).
    #[error("dataset error: {0}")]
    DatasetError(String),

    /// Encoding or decoding a wire envelope failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// One or more scenarios in a batch failed; carries the per-scenario
    /// messages keyed by scenario index.
    #[error("{} scenario(s) failed in batch calculation", .0.len())]
    BatchCalculationError(Vec<(usize, String)>),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GatError.
pub type GatResult<T> = Result<T, GatError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for GatError {
    fn from(err: anyhow::Error) -> Self {
        GatError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for GatError {
    fn from(s: String) -> Self {
        GatError::Other(s)
    }
}

impl From<&str> for GatError {
    fn from(s: &str) -> Self {
        GatError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for GatError {
    fn from(err: serde_json::Error) -> Self {
        GatError::Parse(err.to_string())
    }
}
