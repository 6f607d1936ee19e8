//! # Pairing tables
//!
//! A tab-separated table lists the images of each specimen group:
//!
//! ```text
//! id:group	barcode	path
//! 1	S01	/data/S01.qptiff
//! 1	S02	/data/S02.qptiff
//! ```
//!
//! The first image of a group is the reference; every other image of the group is
//! registered against it.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

/// Column holding the group identifier.
pub const COLUMN_GROUP: &str = "id:group";
/// Column holding the image barcode.
pub const COLUMN_BARCODE: &str = "barcode";
/// Column holding the image path.
pub const COLUMN_PATH: &str = "path";

/// Error types for the pairing table.
#[derive(Debug, thiserror::Error)]
pub enum GroupingError {
    /// Error reading file
    #[error("error reading pairing table")]
    IoError(#[from] std::io::Error),

    /// Malformed delimited data
    #[error("failed to parse pairing table: {0}")]
    CsvError(#[from] csv::Error),

    /// The table is empty
    #[error("pairing table has no header line")]
    MissingHeader,

    /// A required column is absent from the header
    #[error("pairing table is missing the '{0}' column")]
    MissingColumn(&'static str),

    /// A row has fewer fields than the header requires
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    ShortRow {
        /// One-based line number.
        line: usize,
        /// Number of fields required.
        expected: usize,
        /// Number of fields present.
        found: usize,
    },
}

/// A reference/query image pair to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    /// The group both images belong to.
    pub group: String,
    /// Barcode of the reference image.
    pub barcode_reference: String,
    /// Barcode of the query image.
    pub barcode_query: String,
    /// Path of the reference image.
    pub path_reference: PathBuf,
    /// Path of the query image.
    pub path_query: PathBuf,
}

struct Row {
    group: String,
    barcode: String,
    path: PathBuf,
}

/// Read the pairing table at `path`.
pub fn read_pairs_table(path: impl AsRef<Path>) -> Result<Vec<ImagePair>, GroupingError> {
    let file = File::open(path)?;
    parse_pairs_table(file)
}

/// Parse a pairing table.
///
/// Fields may be quoted. Groups are ordered by identifier, numerically when every
/// identifier is an integer. Row order inside a group is kept.
pub fn parse_pairs_table<R: Read>(reader: R) -> Result<Vec<ImagePair>, GroupingError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(GroupingError::MissingHeader);
    }
    let index_of = |name: &'static str| {
        headers
            .iter()
            .position(|c| c == name)
            .ok_or(GroupingError::MissingColumn(name))
    };
    let (i_group, i_barcode, i_path) = (
        index_of(COLUMN_GROUP)?,
        index_of(COLUMN_BARCODE)?,
        index_of(COLUMN_PATH)?,
    );
    let required = i_group.max(i_barcode).max(i_path) + 1;

    let mut rows = Vec::new();
    for (n, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        if record.len() < required {
            return Err(GroupingError::ShortRow {
                line: record
                    .position()
                    .map_or(n + 2, |pos| pos.line() as usize),
                expected: required,
                found: record.len(),
            });
        }
        rows.push(Row {
            group: record[i_group].to_string(),
            barcode: record[i_barcode].to_string(),
            path: PathBuf::from(&record[i_path]),
        });
    }

    // stable sorts keep the row order inside each group
    if rows.iter().all(|r| r.group.parse::<i64>().is_ok()) {
        rows.sort_by_key(|r| r.group.parse::<i64>().unwrap_or_default());
    } else {
        rows.sort_by(|a, b| a.group.cmp(&b.group));
    }

    let mut pairs = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let end = rows[start..]
            .iter()
            .position(|r| r.group != rows[start].group)
            .map_or(rows.len(), |offset| start + offset);

        let reference = &rows[start];
        for query in &rows[start + 1..end] {
            pairs.push(ImagePair {
                group: reference.group.clone(),
                barcode_reference: reference.barcode.clone(),
                barcode_query: query.barcode.clone(),
                path_reference: reference.path.clone(),
                path_query: query.path.clone(),
            });
        }
        start = end;
    }

    log::debug!("Read {} image pairs from {} rows", pairs.len(), rows.len());

    Ok(pairs)
}

/// A position in a list of image pairs.
///
/// Moving past either end clamps to the first or last pair.
#[derive(Debug, Clone)]
pub struct PairCursor {
    pairs: Vec<ImagePair>,
    index: usize,
}

impl PairCursor {
    /// Create a cursor positioned at the first pair.
    pub fn new(pairs: Vec<ImagePair>) -> Self {
        Self { pairs, index: 0 }
    }

    /// The current index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The pair at the current index.
    pub fn current(&self) -> Option<&ImagePair> {
        self.pairs.get(self.index)
    }

    /// Move by `delta` pairs, clamping to the valid range, and return the new index.
    pub fn advance(&mut self, delta: isize) -> usize {
        let last = self.pairs.len().saturating_sub(1);
        self.index = self.index.saturating_add_signed(delta).min(last);
        self.index
    }

    /// Move to the next pair and return it.
    pub fn next_pair(&mut self) -> Option<&ImagePair> {
        self.advance(1);
        self.current()
    }

    /// Move to the previous pair and return it.
    pub fn previous_pair(&mut self) -> Option<&ImagePair> {
        self.advance(-1);
        self.current()
    }
}
