use thiserror::Error;

/// Top-level error type for the sheetfold engine.
#[derive(Debug, Error)]
pub enum SheetfoldError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Nesting(#[from] NestingError),

    #[error(transparent)]
    Distortion(#[from] DistortionExceeded),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SheetfoldError {
    /// Returns `true` if a solver or nesting budget was exhausted.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Solver(SolverError::Timeout { .. }))
    }

    /// Returns `true` for errors that are reported alongside a usable result.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Distortion(_))
    }
}

/// Errors raised while building or validating a mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("unsupported topology: {0}")]
    UnsupportedTopology(String),
}

/// Errors raised by the numerical and combinatorial solvers.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver failure: {0}")]
    SolverFailure(String),

    #[error("{stage} exceeded its budget after {iterations} iterations ({elapsed_ms} ms)")]
    Timeout {
        stage: &'static str,
        iterations: usize,
        elapsed_ms: u64,
    },
}

/// Errors raised while turning a flattening into a placeable pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("degenerate pattern: {0}")]
    DegeneratePattern(String),
}

/// Errors raised by the nesting engine.
#[derive(Debug, Error)]
pub enum NestingError {
    #[error("out of material: {0}")]
    OutOfMaterial(String),
}

/// Soft failure: the flattening is usable but some faces exceed the
/// requested distortion tolerance.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{} face(s) exceed distortion tolerance {tolerance} (max {max_distortion})", faces.len())]
pub struct DistortionExceeded {
    /// Indices of the offending faces.
    pub faces: Vec<usize>,
    /// Largest distortion over the whole mesh.
    pub max_distortion: f64,
    /// Tolerance requested by the caller.
    pub tolerance: f64,
}

/// Convenience type alias for results using [`SheetfoldError`].
pub type Result<T> = std::result::Result<T, SheetfoldError>;
