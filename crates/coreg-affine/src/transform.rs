use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use faer::Mat;

use crate::error::AffineError;
use crate::io::itk::{self, ItkError, ItkTransform};
use crate::linalg;

/// The six independent parameters of a 2d affine transform.
///
/// The homogeneous matrix they describe is
///
/// ```text
/// | a  b  xoff |
/// | c  d  yoff |
/// | 0  0   1   |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AffineParams {
    /// Row 0, column 0.
    pub a: f64,
    /// Row 0, column 1.
    pub b: f64,
    /// Row 1, column 0.
    pub c: f64,
    /// Row 1, column 1.
    pub d: f64,
    /// Translation along x.
    pub xoff: f64,
    /// Translation along y.
    pub yoff: f64,
}

impl AffineParams {
    /// Names of the parameters in the order used by parameter maps.
    pub const NAMES: [&'static str; 6] = ["a", "b", "c", "d", "xoff", "yoff"];

    /// The identity parameters.
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        xoff: 0.0,
        yoff: 0.0,
    };
}

/// An immutable 2d affine transform.
///
/// The six parameters are the stored value; the homogeneous matrix, the parameter map
/// and the flat list are all derived on demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    params: AffineParams,
}

impl AffineTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self::from_parameters(AffineParams::IDENTITY)
    }

    /// Create a transform from its named parameters.
    pub fn from_parameters(params: AffineParams) -> Self {
        Self { params }
    }

    /// Create a transform from a parameter map with the keys `a, b, c, d, xoff, yoff`.
    ///
    /// Extra keys are ignored.
    pub fn from_parameter_map(map: &BTreeMap<String, f64>) -> Result<Self, AffineError> {
        let get = |name: &'static str| {
            map.get(name)
                .copied()
                .ok_or(AffineError::MissingParameter(name))
        };
        Ok(Self::from_parameters(AffineParams {
            a: get("a")?,
            b: get("b")?,
            c: get("c")?,
            d: get("d")?,
            xoff: get("xoff")?,
            yoff: get("yoff")?,
        }))
    }

    /// Create a transform from the first two matrix rows flattened as
    /// `[a, b, xoff, c, d, yoff]`.
    pub fn from_list(values: [f64; 6]) -> Self {
        let [a, b, xoff, c, d, yoff] = values;
        Self::from_parameters(AffineParams {
            a,
            b,
            c,
            d,
            xoff,
            yoff,
        })
    }

    /// Create a transform from a full homogeneous matrix.
    ///
    /// Fails with [`AffineError::NotAffine`] unless the bottom row is `[0, 0, 1]`.
    pub fn from_matrix(matrix: &[[f64; 3]; 3]) -> Result<Self, AffineError> {
        if matrix[2] != [0.0, 0.0, 1.0] {
            return Err(AffineError::NotAffine(matrix[2]));
        }
        Ok(Self::from_list([
            matrix[0][0],
            matrix[0][1],
            matrix[0][2],
            matrix[1][0],
            matrix[1][1],
            matrix[1][2],
        ]))
    }

    /// Create a transform from row-major matrix values.
    ///
    /// Accepts either the 6 values of the first two rows, in which case the bottom
    /// row is synthesized, or all 9 values of the homogeneous matrix.
    pub fn from_values(values: &[f64]) -> Result<Self, AffineError> {
        match values.len() {
            6 => {
                let mut list = [0.0; 6];
                list.copy_from_slice(values);
                Ok(Self::from_list(list))
            }
            9 => Self::from_matrix(&[
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
                [values[6], values[7], values[8]],
            ]),
            n => Err(AffineError::InvalidValueCount(n)),
        }
    }

    /// Read a transform from an ITK transform file.
    pub fn from_itk_file(path: impl AsRef<Path>) -> Result<Self, ItkError> {
        Ok(itk::read_itk_transform(path)?.to_affine())
    }

    /// The homogeneous 3x3 matrix.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        let p = &self.params;
        [[p.a, p.b, p.xoff], [p.c, p.d, p.yoff], [0.0, 0.0, 1.0]]
    }

    /// The homogeneous 3x3 matrix as a faer matrix.
    pub fn to_faer(&self) -> Mat<f64> {
        linalg::array33_to_mat(&self.to_matrix())
    }

    /// The named parameters.
    pub fn to_parameters(&self) -> AffineParams {
        self.params
    }

    /// The parameters as a map keyed by name.
    pub fn to_parameter_map(&self) -> BTreeMap<String, f64> {
        let p = &self.params;
        AffineParams::NAMES
            .iter()
            .zip([p.a, p.b, p.c, p.d, p.xoff, p.yoff])
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// The first two matrix rows flattened as `[a, b, xoff, c, d, yoff]`.
    pub fn to_list(&self) -> [f64; 6] {
        let p = &self.params;
        [p.a, p.b, p.xoff, p.c, p.d, p.yoff]
    }

    /// Build the ITK representation and optionally write it to `path`.
    ///
    /// The ITK parameter order is `a, b, c, d, xoff, yoff`, which differs from
    /// [`Self::to_list`].
    pub fn to_itk(&self, path: Option<&Path>) -> Result<ItkTransform, ItkError> {
        let transform = ItkTransform::from_affine(&self.params);
        if let Some(path) = path {
            itk::write_itk_transform(path, &transform)?;
        }
        Ok(transform)
    }

    /// Apply the transform to a single point.
    pub fn transform_point(&self, point: [f64; 2]) -> [f64; 2] {
        let p = &self.params;
        let [x, y] = point;
        [p.a * x + p.b * y + p.xoff, p.c * x + p.d * y + p.yoff]
    }

    /// Apply the transform to a set of points.
    ///
    /// The points are stacked into a homogeneous 3xN matrix and multiplied by the
    /// transform matrix.
    pub fn transform_points(&self, points: &[[f64; 2]]) -> Result<Vec<[f64; 2]>, AffineError> {
        let src = linalg::to_homogeneous(points);
        let dst = linalg::multiply(self.to_faer().as_ref(), src.as_ref())?;
        Ok(linalg::from_homogeneous(dst.as_ref()))
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f64 {
        self.params.a * self.params.d - self.params.b * self.params.c
    }

    /// The transform applying `other` first and then `self`.
    pub fn compose(&self, other: &AffineTransform) -> AffineTransform {
        let (l, r) = (&self.params, &other.params);
        Self::from_parameters(AffineParams {
            a: l.a * r.a + l.b * r.c,
            b: l.a * r.b + l.b * r.d,
            c: l.c * r.a + l.d * r.c,
            d: l.c * r.b + l.d * r.d,
            xoff: l.a * r.xoff + l.b * r.yoff + l.xoff,
            yoff: l.c * r.xoff + l.d * r.yoff + l.yoff,
        })
    }

    /// The inverse transform, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        let p = &self.params;
        let (a, b, c, d) = (p.d / det, -p.b / det, -p.c / det, p.a / det);
        Some(Self::from_parameters(AffineParams {
            a,
            b,
            c,
            d,
            xoff: -(a * p.xoff + b * p.yoff),
            yoff: -(c * p.xoff + d * p.yoff),
        }))
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 6]> for AffineTransform {
    fn from(values: [f64; 6]) -> Self {
        Self::from_list(values)
    }
}

impl From<AffineParams> for AffineTransform {
    fn from(params: AffineParams) -> Self {
        Self::from_parameters(params)
    }
}

impl fmt::Display for AffineTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .to_list()
            .iter()
            .map(|v| format!("{v:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "AffineTransform({values})")
    }
}
