use faer::{Mat, MatRef};

use crate::error::LinalgError;

/// Returns the shape of a matrix as `(rows, cols)`.
pub fn shape(mat: MatRef<'_, f64>) -> (usize, usize) {
    (mat.nrows(), mat.ncols())
}

/// Multiply two matrices.
///
/// # Arguments
///
/// * `left` - The left operand with shape (M, K).
/// * `right` - The right operand with shape (K, N).
///
/// # Returns
///
/// The product with shape (M, N), or [`LinalgError::DimensionMismatch`] when the
/// inner dimensions differ. No broadcasting is performed.
///
/// Example:
///
/// ```
/// use coreg_affine::linalg::multiply;
///
/// let left = faer::mat![[1.0, 0.0, 20.0], [0.0, 1.0, 10.0], [0.0, 0.0, 1.0]];
/// let right = faer::mat![[13.0], [-1.0], [1.0]];
/// let out = multiply(left.as_ref(), right.as_ref()).unwrap();
/// assert_eq!(out.read(0, 0), 33.0);
/// assert_eq!(out.read(1, 0), 9.0);
/// ```
pub fn multiply(left: MatRef<'_, f64>, right: MatRef<'_, f64>) -> Result<Mat<f64>, LinalgError> {
    if left.ncols() != right.nrows() {
        let err = LinalgError::DimensionMismatch {
            left: shape(left),
            right: shape(right),
        };
        log::error!("{err}");
        return Err(err);
    }

    let mut out = Mat::<f64>::zeros(left.nrows(), right.ncols());
    faer::linalg::matmul::matmul(
        out.as_mut(),
        left,
        right,
        None,
        1.0,
        faer::Parallelism::None,
    );

    Ok(out)
}

/// Stack 2d points as columns of a homogeneous 3xN matrix.
///
/// The first two rows hold the x and y coordinates and the third row is all ones.
pub fn to_homogeneous(points: &[[f64; 2]]) -> Mat<f64> {
    Mat::<f64>::from_fn(3, points.len(), |i, j| match i {
        0 => points[j][0],
        1 => points[j][1],
        _ => 1.0,
    })
}

/// Read back the 2d points stored in the columns of a homogeneous matrix.
///
/// The third row is dropped without dividing by it; for the affine matrices used
/// in this crate it is always one.
///
/// PRECONDITION: `mat` has at least two rows.
pub fn from_homogeneous(mat: MatRef<'_, f64>) -> Vec<[f64; 2]> {
    (0..mat.ncols())
        .map(|j| [mat.read(0, j), mat.read(1, j)])
        .collect()
}

/// Convert a 3x3 array into an owned faer matrix.
pub fn array33_to_mat(array: &[[f64; 3]; 3]) -> Mat<f64> {
    Mat::<f64>::from_fn(3, 3, |i, j| array[i][j])
}

/// Convert a 3x3 faer matrix into a row-major array.
///
/// PRECONDITION: `mat` has shape (3, 3).
pub fn mat_to_array33(mat: MatRef<'_, f64>) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = mat.read(i, j);
        }
    }
    out
}
