use faer::{Mat, MatRef};

use crate::error::{AffineError, LinalgError};
use crate::linalg;
use crate::transform::AffineTransform;

/// Parameters of the affine solver.
#[derive(Debug, Clone)]
pub struct SolverParams {
    /// Solved coefficients with an absolute value below this are snapped to zero.
    pub zero_tol: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self { zero_tol: 1e-3 }
    }
}

/// Build the (2N, 6) design matrix of the affine system.
///
/// Each reference point `(x, y)` contributes the rows `[x, y, 1, 0, 0, 0]` and
/// `[0, 0, 0, x, y, 1]`.
pub fn build_design_matrix(reference: &[[f64; 2]]) -> Mat<f64> {
    let mut mat_a = Mat::<f64>::zeros(2 * reference.len(), 6);
    for (i, &[x, y]) in reference.iter().enumerate() {
        mat_a.write(2 * i, 0, x);
        mat_a.write(2 * i, 1, y);
        mat_a.write(2 * i, 2, 1.0);
        mat_a.write(2 * i + 1, 3, x);
        mat_a.write(2 * i + 1, 4, y);
        mat_a.write(2 * i + 1, 5, 1.0);
    }
    mat_a
}

/// Build the (2N, 1) target vector by flattening the query points row-major.
pub fn build_target_vector(query: &[[f64; 2]]) -> Mat<f64> {
    Mat::<f64>::from_fn(2 * query.len(), 1, |i, _| query[i / 2][i % 2])
}

/// Moore–Penrose pseudo-inverse of a matrix.
///
/// Computed from the SVD as `V Σ⁺ Uᵀ`. Singular values below
/// `max(rows, cols) * σ_max * f64::EPSILON` are treated as zero.
pub fn pseudo_inverse(mat: MatRef<'_, f64>) -> Mat<f64> {
    let (nrows, ncols) = linalg::shape(mat);
    if nrows == 0 || ncols == 0 {
        return Mat::<f64>::zeros(ncols, nrows);
    }

    let svd = mat.svd();
    let u = svd.u();
    let v = svd.v();
    let s = svd.s_diagonal();

    let sigma_max = (0..s.nrows()).map(|k| s.read(k)).fold(0.0, f64::max);
    let cutoff = nrows.max(ncols) as f64 * sigma_max * f64::EPSILON;

    let sigma_inv = (0..s.nrows())
        .map(|k| {
            let sigma = s.read(k);
            if sigma > cutoff {
                1.0 / sigma
            } else {
                0.0
            }
        })
        .collect::<Vec<_>>();

    Mat::<f64>::from_fn(ncols, nrows, |i, j| {
        sigma_inv
            .iter()
            .enumerate()
            .map(|(k, inv)| v.read(i, k) * inv * u.read(j, k))
            .sum::<f64>()
    })
}

/// Computes the 2d affine transformation matrix from point correspondences.
///
/// * `reference` - The reference points with shape (N, 2).
/// * `query` - The query points with shape (N, 2).
///
/// # Returns
///
/// The homogeneous affine matrix with shape (3, 3) mapping reference points onto
/// query points in the least-squares sense. See [`solve_affine_with`].
pub fn solve_affine(
    reference: &[[f64; 2]],
    query: &[[f64; 2]],
) -> Result<[[f64; 3]; 3], AffineError> {
    solve_affine_with(reference, query, &SolverParams::default())
}

/// Computes the 2d affine transformation matrix with explicit solver parameters.
///
/// The system `S · p = T` is solved for `p = [a, b, xoff, c, d, yoff]` through the
/// pseudo-inverse of `S`, so three non-collinear points give the exact solution and
/// more points give the least-squares fit. Fewer than three points are accepted but
/// the result is not unique.
///
/// Coefficients smaller than `params.zero_tol` in magnitude are returned as exactly zero.
pub fn solve_affine_with(
    reference: &[[f64; 2]],
    query: &[[f64; 2]],
    params: &SolverParams,
) -> Result<[[f64; 3]; 3], AffineError> {
    if reference.is_empty() && query.is_empty() {
        return Err(AffineError::EmptyInput);
    }

    let mat_s = build_design_matrix(reference);
    let mat_t = build_target_vector(query);

    if mat_s.nrows() != mat_t.nrows() {
        log::error!("Could not calculate transform due to mismatched dimensions.");
        log::error!("Shape of design matrix: {:?}", linalg::shape(mat_s.as_ref()));
        log::error!("Shape of target vector: {:?}", linalg::shape(mat_t.as_ref()));
        return Err(LinalgError::DimensionMismatch {
            left: linalg::shape(mat_s.as_ref()),
            right: linalg::shape(mat_t.as_ref()),
        }
        .into());
    }

    if reference.len() < 3 {
        log::warn!(
            "Solving an under-determined affine system with {} correspondences",
            reference.len()
        );
    }

    let pinv = pseudo_inverse(mat_s.as_ref());
    let params_col = linalg::multiply(pinv.as_ref(), mat_t.as_ref())?;

    let p = (0..6)
        .map(|i| {
            let value = params_col.read(i, 0);
            if value.abs() < params.zero_tol {
                0.0
            } else {
                value
            }
        })
        .collect::<Vec<_>>();

    log::debug!("Solved affine parameters from {} pairs: {:?}", reference.len(), p);

    Ok([[p[0], p[1], p[2]], [p[3], p[4], p[5]], [0.0, 0.0, 1.0]])
}

/// Fit an [`AffineTransform`] to point correspondences with the default parameters.
pub fn fit_affine(
    reference: &[[f64; 2]],
    query: &[[f64; 2]],
) -> Result<AffineTransform, AffineError> {
    let matrix = solve_affine(reference, query)?;
    AffineTransform::from_matrix(&matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_affine_exact_three_points() -> Result<(), AffineError> {
        let reference = [[1.0, 1.0], [13.0, 4.0], [10.0, -2.0]];
        let query = [[13.5, -7.0], [19.5, -1.0], [18.0, -13.0]];
        let expected = [[0.5, 0.0, 13.0], [0.0, 2.0, -9.0], [0.0, 0.0, 1.0]];

        let matrix = solve_affine(&reference, &query)?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(matrix[i][j], expected[i][j], epsilon = 1e-9);
            }
        }
        // snapped terms are exactly zero, not tiny residuals
        assert_eq!(matrix[0][1], 0.0);
        assert_eq!(matrix[1][0], 0.0);
        assert_eq!(matrix[2], [0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_solve_affine_identity() -> Result<(), AffineError> {
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let matrix = solve_affine(&points, &points)?;
        assert_relative_eq!(matrix[0][0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(matrix[1][1], 1.0, epsilon = 1e-9);
        assert_eq!(matrix[0][2], 0.0);
        assert_eq!(matrix[1][2], 0.0);
        Ok(())
    }

    #[test]
    fn test_solve_affine_least_squares() -> Result<(), AffineError> {
        // rotation by 30 degrees, anisotropic scale and translation
        let (s, c) = 30f64.to_radians().sin_cos();
        let (a, b, xoff) = (1.2 * c, -0.8 * s, 250.0);
        let (cc, d, yoff) = (1.2 * s, 0.8 * c, -75.5);

        let reference = [
            [10.0, 20.0],
            [400.0, 35.0],
            [380.0, 410.0],
            [15.0, 390.0],
            [200.0, 200.0],
        ];
        // small symmetric noise keeps the fit close to the generating parameters
        let noise = [[0.1, -0.1], [-0.1, 0.1], [0.1, 0.1], [-0.1, -0.1], [0.0, 0.0]];
        let query = reference
            .iter()
            .zip(noise.iter())
            .map(|(&[x, y], &[nx, ny])| [a * x + b * y + xoff + nx, cc * x + d * y + yoff + ny])
            .collect::<Vec<_>>();

        let matrix = solve_affine(&reference, &query)?;
        assert_relative_eq!(matrix[0][0], a, epsilon = 1e-3);
        assert_relative_eq!(matrix[0][1], b, epsilon = 1e-3);
        assert_relative_eq!(matrix[0][2], xoff, epsilon = 0.5);
        assert_relative_eq!(matrix[1][0], cc, epsilon = 1e-3);
        assert_relative_eq!(matrix[1][1], d, epsilon = 1e-3);
        assert_relative_eq!(matrix[1][2], yoff, epsilon = 0.5);
        Ok(())
    }

    #[test]
    fn test_solve_affine_snaps_small_coefficients() -> Result<(), AffineError> {
        // a shear of 5e-4 is below the default threshold
        let reference = [[0.0, 0.0], [100.0, 0.0], [0.0, 100.0], [100.0, 100.0]];
        let query = reference
            .iter()
            .map(|&[x, y]| [x + 5e-4 * y + 3.0, y - 2.0])
            .collect::<Vec<_>>();

        let matrix = solve_affine(&reference, &query)?;
        assert_eq!(matrix[0][1], 0.0);
        assert_eq!(matrix[1][0], 0.0);
        assert_relative_eq!(matrix[0][2], 3.0, epsilon = 1e-9);

        // a tighter threshold keeps the shear term
        let params = SolverParams { zero_tol: 1e-6 };
        let matrix = solve_affine_with(&reference, &query, &params)?;
        assert_relative_eq!(matrix[0][1], 5e-4, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_solve_affine_mismatched_lengths() {
        let reference = [[1.0, 1.0], [13.0, 4.0], [10.0, -2.0]];
        let query = [[13.5, -7.0], [19.5, -1.0]];
        let err = solve_affine(&reference, &query).unwrap_err();
        assert_eq!(
            err,
            AffineError::Linalg(LinalgError::DimensionMismatch {
                left: (6, 6),
                right: (4, 1)
            })
        );
    }

    #[test]
    fn test_solve_affine_empty() {
        assert_eq!(solve_affine(&[], &[]).unwrap_err(), AffineError::EmptyInput);
    }

    #[test]
    fn test_solve_affine_underdetermined_runs() -> Result<(), AffineError> {
        let matrix = solve_affine(&[[1.0, 2.0], [3.0, 5.0]], &[[2.0, 2.0], [4.0, 5.0]])?;
        assert_eq!(matrix[2], [0.0, 0.0, 1.0]);
        assert!(matrix.iter().flatten().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_design_matrix_layout() {
        let mat = build_design_matrix(&[[2.0, 3.0]]);
        assert_eq!(linalg::shape(mat.as_ref()), (2, 6));
        let rows = [
            [2.0, 3.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 2.0, 3.0, 1.0],
        ];
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                assert_eq!(mat.read(i, j), *v);
            }
        }

        let target = build_target_vector(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(linalg::shape(target.as_ref()), (4, 1));
        assert_eq!(
            (0..4).map(|i| target.read(i, 0)).collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_pseudo_inverse_of_invertible() {
        let mat = faer::mat![[2.0, 0.0], [1.0, 4.0]];
        let pinv = pseudo_inverse(mat.as_ref());
        let expected = [[0.5, 0.0], [-0.125, 0.25]];
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(pinv.read(i, j), expected[i][j], epsilon = 1e-12);
            }
        }
    }
}
