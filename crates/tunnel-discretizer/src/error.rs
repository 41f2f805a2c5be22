//! Error types for the discretizer.

use thiserror::Error;
use tunnel_kernel_geom::GeomError;

/// Errors that can occur while discretizing a tunnel.
#[derive(Error, Debug)]
pub enum DiscretizeError {
    /// No cross-section exists at a candidate position.
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),

    /// Continuity repair hit its iteration cap.
    #[error("continuity repair did not converge after {iterations} iterations (spacing {spacing:.6})")]
    InvariantUnsatisfiable {
        /// Iterations performed.
        iterations: usize,
        /// Endpoint spacing of the last attempt.
        spacing: f64,
    },

    /// The tunnel violates a load-time precondition.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Invalid discretization settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed sphere or disk text.
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Direction cache failure.
    #[error("direction cache: {0}")]
    Cache(String),
}

impl DiscretizeError {
    /// Whether the advancer may retry the current step with a coarser stride.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvariantUnsatisfiable { .. })
    }
}

impl From<GeomError> for DiscretizeError {
    fn from(err: GeomError) -> Self {
        match err {
            GeomError::Degenerate(msg) => Self::GeometryDegenerate(msg),
        }
    }
}

/// Result type for discretizer operations.
pub type Result<T> = std::result::Result<T, DiscretizeError>;
