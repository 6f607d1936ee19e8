use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::transform::{AffineParams, AffineTransform};

/// Name of the 2d affine transform in ITK transform files.
pub const ITK_AFFINE_2D: &str = "AffineTransform_double_2_2";

/// Index of the line holding the transform parameters.
const PARAMETERS_LINE: usize = 3;

/// Index of the line holding the center of rotation.
const FIXED_PARAMETERS_LINE: usize = 4;

/// Error types for the ITK transform module.
#[derive(Debug, thiserror::Error)]
pub enum ItkError {
    /// Error reading or writing file
    #[error("error reading or writing transform file {path:?}")]
    IoError {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file ends before the parameter line
    #[error("{path:?}: expected a parameter line at line {expected}, found only {found} lines")]
    MissingParameterLine {
        /// The file being parsed.
        path: PathBuf,
        /// One-based line number of the expected parameter line.
        expected: usize,
        /// Number of lines present in the file.
        found: usize,
    },

    /// A parameter line holds the wrong number of values
    #[error("{path:?}: expected {expected} parameters, found {found}")]
    InvalidParameterCount {
        /// The file being parsed.
        path: PathBuf,
        /// Number of values required.
        expected: usize,
        /// Number of values found after the leading token.
        found: usize,
    },

    /// Parse error
    #[error("{path:?}: parse error {message}")]
    ParseError {
        /// The file being parsed.
        path: PathBuf,
        /// Description of the offending token.
        message: String,
    },
}

/// A 2d affine transform as stored by ITK / SimpleITK.
#[derive(Debug, Clone, PartialEq)]
pub struct ItkTransform {
    /// The ITK transform type name.
    pub name: String,
    /// Parameters in ITK order: `a, b, c, d, xoff, yoff`.
    pub parameters: [f64; 6],
    /// Center of rotation; the origin for transforms built here and for files
    /// without a `FixedParameters` line.
    pub fixed_parameters: [f64; 2],
}

impl ItkTransform {
    /// Build the ITK transform from named affine parameters.
    pub fn from_affine(params: &AffineParams) -> Self {
        Self {
            name: ITK_AFFINE_2D.to_string(),
            parameters: [params.a, params.b, params.c, params.d, params.xoff, params.yoff],
            fixed_parameters: [0.0, 0.0],
        }
    }

    /// Convert back to an [`AffineTransform`], mapping parameters by name.
    ///
    /// A non-zero center `C` is folded into the offset as `t + C - M·C`.
    pub fn to_affine(&self) -> AffineTransform {
        let [a, b, c, d, tx, ty] = self.parameters;
        let [cx, cy] = self.fixed_parameters;
        AffineTransform::from_parameters(AffineParams {
            a,
            b,
            c,
            d,
            xoff: tx + cx - (a * cx + b * cy),
            yoff: ty + cy - (c * cx + d * cy),
        })
    }
}

impl fmt::Display for ItkTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &[f64]| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        writeln!(f, "#Insight Transform File V1.0")?;
        writeln!(f, "#Transform 0")?;
        writeln!(f, "Transform: {}", self.name)?;
        writeln!(f, "Parameters: {}", join(&self.parameters))?;
        writeln!(f, "FixedParameters: {}", join(&self.fixed_parameters))
    }
}

/// Write an ITK transform file.
///
/// # Arguments
///
/// * `path` - The destination path.
/// * `transform` - The transform to write.
pub fn write_itk_transform(
    path: impl AsRef<Path>,
    transform: &ItkTransform,
) -> Result<(), ItkError> {
    let path = path.as_ref();
    let io_err = |source| ItkError::IoError {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write!(writer, "{transform}").map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    log::debug!("Wrote transform to {}", path.display());

    Ok(())
}

/// Read an ITK transform file.
///
/// The parameter line (the fourth line) has its first token discarded and the
/// following six values parsed as `a, b, c, d, xoff, yoff`. A `FixedParameters`
/// line after it is read as the center of rotation. Later lines are not read.
///
/// # Arguments
///
/// * `path` - The path to the transform file.
pub fn read_itk_transform(path: impl AsRef<Path>) -> Result<ItkTransform, ItkError> {
    let path = path.as_ref();
    let io_err = |source| ItkError::IoError {
        path: path.to_path_buf(),
        source,
    };

    // open the file and create a buffered reader
    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);

    let lines = reader
        .lines()
        .take(FIXED_PARAMETERS_LINE + 1)
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;

    let line = lines
        .get(PARAMETERS_LINE)
        .ok_or_else(|| ItkError::MissingParameterLine {
            path: path.to_path_buf(),
            expected: PARAMETERS_LINE + 1,
            found: lines.len(),
        })?;

    let line_err = |err: LineError| match err {
        LineError::Count { expected, found } => ItkError::InvalidParameterCount {
            path: path.to_path_buf(),
            expected,
            found,
        },
        LineError::Parse(message) => ItkError::ParseError {
            path: path.to_path_buf(),
            message,
        },
    };

    let parameters = parse_values::<6>(line).map_err(line_err)?;

    let fixed_parameters = match lines.get(FIXED_PARAMETERS_LINE) {
        Some(l) if l.starts_with("FixedParameters") => parse_values::<2>(l).map_err(line_err)?,
        _ => [0.0, 0.0],
    };

    // the transform name sits on the line above the parameters
    let name = lines
        .get(PARAMETERS_LINE - 1)
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or(ITK_AFFINE_2D)
        .to_string();

    Ok(ItkTransform {
        name,
        parameters,
        fixed_parameters,
    })
}

enum LineError {
    Count { expected: usize, found: usize },
    Parse(String),
}

/// Parse `<token> v0 .. vN`.
fn parse_values<const N: usize>(line: &str) -> Result<[f64; N], LineError> {
    let values = line
        .split_whitespace()
        .skip(1)
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| LineError::Parse(format!("{s}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    values
        .as_slice()
        .try_into()
        .map_err(|_| LineError::Count {
            expected: N,
            found: values.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_read_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let tx = AffineTransform::from_list([0.9993, -0.0371, 1523.25, 0.0371, 0.9993, -88.125]);
        let file = NamedTempFile::new()?;

        let written = tx.to_itk(Some(file.path()))?;
        let read = read_itk_transform(file.path())?;
        assert_eq!(read, written);
        assert_eq!(read.to_affine(), tx);
        assert_eq!(AffineTransform::from_itk_file(file.path())?, tx);
        Ok(())
    }

    #[test]
    fn test_display_layout() {
        let tx = AffineTransform::from_list([0.5, 0.0, 13.0, 0.0, 2.0, -9.0]);
        let text = ItkTransform::from_affine(&tx.to_parameters()).to_string();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "#Insight Transform File V1.0");
        assert_eq!(lines[2], "Transform: AffineTransform_double_2_2");
        assert_eq!(lines[3], "Parameters: 0.5 0 0 2 13 -9");
        assert_eq!(lines[4], "FixedParameters: 0 0");
    }

    #[test]
    fn test_read_external_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            "#Insight Transform File V1.0\n#Transform 0\nTransform: AffineTransform_double_2_2\nParameters: 1.01 0.02 -0.03 0.98 120.5 -33.25\nFixedParameters: 0 0\n"
        )?;

        let tx = read_itk_transform(file.path())?;
        assert_eq!(tx.name, ITK_AFFINE_2D);
        let params = tx.to_affine().to_parameters();
        assert_eq!(params.a, 1.01);
        assert_eq!(params.b, 0.02);
        assert_eq!(params.c, -0.03);
        assert_eq!(params.d, 0.98);
        assert_eq!(params.xoff, 120.5);
        assert_eq!(params.yoff, -33.25);
        Ok(())
    }

    #[test]
    fn test_read_missing_line() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        write!(file, "#Insight Transform File V1.0\n#Transform 0\n")?;

        match read_itk_transform(file.path()) {
            Err(ItkError::MissingParameterLine {
                expected, found, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_read_wrong_count_and_garbage() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        write!(file, "#\n#\nTransform: X\nParameters: 1 0 0 1\n")?;
        assert!(matches!(
            read_itk_transform(file.path()),
            Err(ItkError::InvalidParameterCount {
                expected: 6,
                found: 4,
                ..
            })
        ));

        let mut file = NamedTempFile::new()?;
        write!(file, "#\n#\nTransform: X\nParameters: 1 0 zero 1 0 0\n")?;
        assert!(matches!(
            read_itk_transform(file.path()),
            Err(ItkError::ParseError { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_read_fixed_parameters() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            "#Insight Transform File V1.0\n#Transform 0\nTransform: AffineTransform_double_2_2\nParameters: 0 -1 1 0 5 0\nFixedParameters: 10 20\n"
        )?;

        let itk = read_itk_transform(file.path())?;
        assert_eq!(itk.fixed_parameters, [10.0, 20.0]);

        // 90 degree rotation about (10, 20), then a shift of 5 along x
        let tx = itk.to_affine();
        assert_eq!(tx.transform_point([10.0, 20.0]), [15.0, 20.0]);
        assert_eq!(tx.transform_point([11.0, 20.0]), [15.0, 21.0]);

        let mut file = NamedTempFile::new()?;
        write!(file, "#\n#\nTransform: X\nParameters: 1 0 0 1 0 0\nFixedParameters: 1\n")?;
        assert!(matches!(
            read_itk_transform(file.path()),
            Err(ItkError::InvalidParameterCount {
                expected: 2,
                found: 1,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_read_ignores_trailing_content() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(
            b"#Insight Transform File V1.0\n#Transform 0\nTransform: AffineTransform_double_2_2\nParameters: 1 0 0 1 2 3\nFixedParameters: 0 0\n\xff\xfe not utf-8\n",
        )?;

        let tx = read_itk_transform(file.path())?.to_affine();
        assert_eq!(tx.to_list(), [1.0, 0.0, 2.0, 0.0, 1.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_itk_transform("/nonexistent/transform.txt").unwrap_err();
        assert!(matches!(err, ItkError::IoError { .. }));
        assert!(err.to_string().contains("/nonexistent/transform.txt"));
    }
}
