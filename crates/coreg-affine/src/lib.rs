#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Point-pair accumulation for one reference/query image pair.
pub mod accumulator;

/// Error types shared by the solver and the transform representation.
pub mod error;

/// Reference/query pairing tables.
pub mod grouping;

/// I/O utilities for transform files and registration records.
pub mod io;

/// Linear algebra utilities over homogeneous 2d coordinates.
pub mod linalg;

/// Image provider interface used to fetch backdrop channels.
pub mod provider;

/// Least-squares affine solver.
pub mod solver;

/// Affine transform value type.
pub mod transform;

pub use accumulator::{PointAccumulator, PointPair, Side};
pub use error::AffineError;
pub use solver::{fit_affine, solve_affine, SolverParams};
pub use transform::{AffineParams, AffineTransform};
