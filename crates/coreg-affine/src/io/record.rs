use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::accumulator::{AccumulatorError, PointAccumulator};
use crate::io::itk::ItkError;
use crate::transform::AffineParams;

/// Error types for the registration record module.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Error reading or writing file
    #[error("error reading or writing record {path:?}")]
    IoError {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON or missing keys
    #[error("invalid registration record {path:?}")]
    JsonError {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Refused to replace an existing record
    #[error("record already exists: {0:?}")]
    AlreadyExists(PathBuf),

    /// The accumulated points could not be turned into a record
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    /// The transform file could not be written
    #[error(transparent)]
    Itk(#[from] ItkError),
}

/// One landmark correspondence as stored in a registration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRecord {
    /// Barcode of the reference image.
    #[serde(rename = "barcode:left")]
    pub barcode_left: String,
    /// Barcode of the query image.
    #[serde(rename = "barcode:right")]
    pub barcode_right: String,
    /// Reference x coordinate.
    #[serde(rename = "left:x")]
    pub left_x: f64,
    /// Reference y coordinate.
    #[serde(rename = "left:y")]
    pub left_y: f64,
    /// Query x coordinate.
    #[serde(rename = "right:x")]
    pub right_x: f64,
    /// Query y coordinate.
    #[serde(rename = "right:y")]
    pub right_y: f64,
}

/// A persisted manual registration session.
///
/// Fields are declared in key order so the serialized JSON is sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Barcode of the query image.
    #[serde(rename = "barcode:query")]
    pub barcode_query: String,
    /// Barcode of the reference image.
    #[serde(rename = "barcode:reference")]
    pub barcode_reference: String,
    /// The homogeneous transform matrix as nested rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<Vec<f64>>>,
    /// The landmark correspondences in entry order.
    #[serde(rename = "transform:coordinates")]
    pub coordinates: Vec<CoordinateRecord>,
    /// The named transform parameters.
    #[serde(
        rename = "transform:parameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parameters: Option<AffineParams>,
}

impl RegistrationRecord {
    /// The reference and query point sequences, in order.
    pub fn points(&self) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
        self.coordinates
            .iter()
            .map(|c| ([c.left_x, c.left_y], [c.right_x, c.right_y]))
            .unzip()
    }
}

/// Write a registration record as pretty-printed JSON.
///
/// # Arguments
///
/// * `path` - The destination path.
/// * `record` - The record to write.
pub fn export_record(path: impl AsRef<Path>, record: &RegistrationRecord) -> Result<(), RecordError> {
    let path = path.as_ref();
    let io_err = |source| RecordError::IoError {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record).map_err(|source| RecordError::JsonError {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    log::debug!(
        "Saved {} correspondences to {}",
        record.coordinates.len(),
        path.display()
    );

    Ok(())
}

/// Read a registration record.
pub fn read_record(path: impl AsRef<Path>) -> Result<RegistrationRecord, RecordError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| RecordError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| RecordError::JsonError {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a registration record back into its reference and query point sequences.
pub fn import_record(
    path: impl AsRef<Path>,
) -> Result<(Vec<[f64; 2]>, Vec<[f64; 2]>), RecordError> {
    Ok(read_record(path)?.points())
}

/// Output file names of a saved registration session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPaths {
    /// The JSON registration record.
    pub record: PathBuf,
    /// The ITK transform file.
    pub transform: PathBuf,
}

impl SessionPaths {
    /// Paths for the pair `reference_id`/`query_id` inside `folder`.
    pub fn new(folder: impl AsRef<Path>, reference_id: &str, query_id: &str) -> Self {
        let prefix = format!("{reference_id}-{query_id}");
        let folder = folder.as_ref();
        Self {
            record: folder.join(format!("{prefix}.transform.calculated.json")),
            transform: folder.join(format!("{prefix}.transform.sitk.txt")),
        }
    }
}

/// Save a session: the JSON record and the ITK transform file.
///
/// An existing record is only replaced when `overwrite` is set.
pub fn save_session(
    folder: impl AsRef<Path>,
    accumulator: &PointAccumulator,
    overwrite: bool,
) -> Result<SessionPaths, RecordError> {
    let paths = SessionPaths::new(folder, accumulator.reference_id(), accumulator.query_id());
    if !overwrite && paths.record.exists() {
        return Err(RecordError::AlreadyExists(paths.record));
    }

    let export = accumulator.export_record()?;
    export.transform.to_itk(Some(&paths.transform))?;
    export_record(&paths.record, &export.record)?;

    log::info!("Saved session to {}", paths.record.display());

    Ok(paths)
}
