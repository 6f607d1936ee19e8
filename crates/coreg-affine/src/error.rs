/// Error types for the matrix utilities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinalgError {
    /// The operands of a product have incompatible shapes.
    #[error("Invalid matrix dimensions for multiplication: left {left:?}, right {right:?}")]
    DimensionMismatch {
        /// Shape of the left operand as `(rows, cols)`.
        left: (usize, usize),
        /// Shape of the right operand as `(rows, cols)`.
        right: (usize, usize),
    },
}

/// Error types for affine estimation and the transform representation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AffineError {
    /// Shape incompatibility while building or solving the linear system.
    #[error(transparent)]
    Linalg(#[from] LinalgError),

    /// No point correspondences were given to the solver.
    #[error("Cannot estimate an affine transform from zero correspondences")]
    EmptyInput,

    /// A full matrix was given whose bottom row is not `[0, 0, 1]`.
    #[error("Matrix is not affine, bottom row is {0:?}")]
    NotAffine([f64; 3]),

    /// A flat value list had neither 6 nor 9 entries.
    #[error("Expected 6 or 9 matrix values, got {0}")]
    InvalidValueCount(usize),

    /// A parameter map lacked one of `a, b, c, d, xoff, yoff`.
    #[error("Missing affine parameter '{0}'")]
    MissingParameter(&'static str),
}
