//! # Point-pair accumulation
//!
//! Landmarks are entered one point at a time, alternating between the reference and
//! the query image. [`PointAccumulator`] keeps both sequences balanced, remembers
//! recent entries for undo and hands the finished pairs to the solver.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::error::AffineError;
use crate::io::record::{CoordinateRecord, RegistrationRecord};
use crate::solver::{self, SolverParams};
use crate::transform::AffineTransform;

/// Default number of undo steps.
pub const DEFAULT_UNDO_DEPTH: usize = 16;

/// Error types for the point accumulator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccumulatorError {
    /// The side label is not one of `reference`/`left` or `query`/`right`.
    #[error("Please specify one of ['reference', 'query'] (received '{0}')")]
    InvalidSide(String),

    /// A valid side that does not fit the current balance of the sequences.
    #[error("Expected to add a point to the {expected} image, but received a point for the {received} image")]
    SideMismatch {
        /// The side the next point has to go to.
        expected: Side,
        /// The side that was requested.
        received: Side,
    },

    /// Undo was requested with nothing to undo.
    #[error("Cannot remove the last point: no points have been added")]
    EmptyHistory,

    /// Undo was requested past the configured undo depth while points remain.
    #[error("Cannot remove the last point: undo history exhausted ({reference} reference and {query} query points remain)")]
    HistoryExhausted {
        /// Number of reference points left.
        reference: usize,
        /// Number of query points left.
        query: usize,
    },

    /// A solve was requested with sequences of different length.
    #[error("The images do not contain the same number of points ({reference} != {query})")]
    UnbalancedPoints {
        /// Number of reference points.
        reference: usize,
        /// Number of query points.
        query: usize,
    },

    /// A point with a NaN or infinite coordinate.
    #[error("Point coordinates must be finite, got {0:?}")]
    NonFinitePoint([f64; 2]),

    /// The solver failed.
    #[error(transparent)]
    Solver(#[from] AffineError),
}

/// The image a point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The reference (left) image.
    Reference,
    /// The query (right) image.
    Query,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Reference => write!(f, "reference"),
            Side::Query => write!(f, "query"),
        }
    }
}

impl FromStr for Side {
    type Err = AccumulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" | "left" => Ok(Side::Reference),
            "query" | "right" => Ok(Side::Query),
            _ => Err(AccumulatorError::InvalidSide(s.to_string())),
        }
    }
}

/// Which side the next point may go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Both sequences have the same length; either side is accepted.
    Free,
    /// The query sequence is longer; only a reference point is accepted.
    AwaitingReference,
    /// The reference sequence is longer; only a query point is accepted.
    AwaitingQuery,
}

impl EntryState {
    /// The state for the given sequence lengths.
    pub fn from_lengths(reference: usize, query: usize) -> Self {
        match reference.cmp(&query) {
            std::cmp::Ordering::Greater => EntryState::AwaitingQuery,
            std::cmp::Ordering::Less => EntryState::AwaitingReference,
            std::cmp::Ordering::Equal => EntryState::Free,
        }
    }
}

/// Decide which side a point goes to given the entry state and the requested side.
///
/// When the sequences are balanced the hint is trusted as-is, so two consecutive
/// points may land on the same side.
pub fn resolve_side(state: EntryState, hint: Side) -> Result<Side, AccumulatorError> {
    let expected = match state {
        EntryState::Free => return Ok(hint),
        EntryState::AwaitingReference => Side::Reference,
        EntryState::AwaitingQuery => Side::Query,
    };
    if hint == expected {
        Ok(hint)
    } else {
        Err(AccumulatorError::SideMismatch {
            expected,
            received: hint,
        })
    }
}

/// A reference point and the query point for the same landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    /// Point in the reference image.
    pub reference: [f64; 2],
    /// Point in the query image.
    pub query: [f64; 2],
}

/// Everything a persistence layer needs from an accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationExport {
    /// The fitted transform.
    pub transform: AffineTransform,
    /// The serializable record, including parameters and matrix.
    pub record: RegistrationRecord,
}

/// Collects landmark points for one reference/query image pair.
#[derive(Debug, Clone)]
pub struct PointAccumulator {
    reference_id: String,
    query_id: String,
    reference: Vec<[f64; 2]>,
    query: Vec<[f64; 2]>,
    history: VecDeque<(Side, [f64; 2])>,
    undo_depth: usize,
}

impl PointAccumulator {
    /// Create an empty accumulator for the given barcodes.
    pub fn new(reference_id: impl Into<String>, query_id: impl Into<String>) -> Self {
        Self::with_undo_depth(reference_id, query_id, DEFAULT_UNDO_DEPTH)
    }

    /// Create an empty accumulator allowing `undo_depth` consecutive undo steps.
    ///
    /// The depth is at least one. One entry more than the depth is retained so that
    /// [`Self::last_added`] still reports the previous point after an undo.
    pub fn with_undo_depth(
        reference_id: impl Into<String>,
        query_id: impl Into<String>,
        undo_depth: usize,
    ) -> Self {
        Self {
            reference_id: reference_id.into(),
            query_id: query_id.into(),
            reference: Vec::new(),
            query: Vec::new(),
            history: VecDeque::new(),
            undo_depth: undo_depth.max(1),
        }
    }

    /// Rebuild an accumulator from a saved record to resume a session.
    pub fn from_record(record: &RegistrationRecord) -> Result<Self, AccumulatorError> {
        let mut acc = Self::new(&record.barcode_reference, &record.barcode_query);
        let (reference, query) = record.points();
        for (r, q) in reference.into_iter().zip(query) {
            acc.add_pair(r, q)?;
        }
        Ok(acc)
    }

    /// Barcode of the reference image.
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// Barcode of the query image.
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// The reference points in entry order.
    pub fn reference_points(&self) -> &[[f64; 2]] {
        &self.reference
    }

    /// The query points in entry order.
    pub fn query_points(&self) -> &[[f64; 2]] {
        &self.query
    }

    /// The current entry state.
    pub fn state(&self) -> EntryState {
        EntryState::from_lengths(self.reference.len(), self.query.len())
    }

    /// The most recently added point still on record.
    pub fn last_added(&self) -> Option<(Side, [f64; 2])> {
        self.history.back().copied()
    }

    /// Append a point to the given side.
    ///
    /// No balance check is made here; see [`Self::submit_point`].
    pub fn append_point(&mut self, point: [f64; 2], side: Side) -> Result<(), AccumulatorError> {
        if !point.iter().all(|v| v.is_finite()) {
            return Err(AccumulatorError::NonFinitePoint(point));
        }

        match side {
            Side::Reference => self.reference.push(point),
            Side::Query => self.query.push(point),
        }

        if self.history.len() > self.undo_depth {
            self.history.pop_front();
        }
        self.history.push_back((side, point));

        log::debug!("Added {point:?} to {side}");
        Ok(())
    }

    /// Append both members of a pair.
    pub fn add_pair(&mut self, reference: [f64; 2], query: [f64; 2]) -> Result<(), AccumulatorError> {
        for v in [reference, query] {
            if !v.iter().all(|c| c.is_finite()) {
                return Err(AccumulatorError::NonFinitePoint(v));
            }
        }
        self.append_point(reference, Side::Reference)?;
        self.append_point(query, Side::Query)
    }

    /// Resolve the side a new point should go to given the requested side.
    pub fn classify_side(&self, hint: Side) -> Result<Side, AccumulatorError> {
        resolve_side(self.state(), hint)
    }

    /// Add an interactively picked point.
    ///
    /// A point that does not fit the current balance is dropped with a warning and
    /// `Ok(None)` is returned; otherwise the side it was added to.
    pub fn submit_point(
        &mut self,
        point: [f64; 2],
        hint: Side,
    ) -> Result<Option<Side>, AccumulatorError> {
        let side = match self.classify_side(hint) {
            Ok(side) => side,
            Err(err @ AccumulatorError::SideMismatch { .. }) => {
                log::warn!("{err}; dropping {point:?}");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.append_point(point, side)?;
        Ok(Some(side))
    }

    /// Remove the most recently added point.
    ///
    /// Fails with [`AccumulatorError::EmptyHistory`] when no points are left and with
    /// [`AccumulatorError::HistoryExhausted`] once the undo depth is used up.
    pub fn undo_last(&mut self) -> Result<(Side, [f64; 2]), AccumulatorError> {
        let total = self.reference.len() + self.query.len();
        if total == 0 {
            return Err(AccumulatorError::EmptyHistory);
        }
        // the oldest retained entry only backs `last_added`, unless it is the last point
        if self.history.len() <= 1 && self.history.len() < total {
            return Err(AccumulatorError::HistoryExhausted {
                reference: self.reference.len(),
                query: self.query.len(),
            });
        }

        let (side, point) = self
            .history
            .pop_back()
            .ok_or(AccumulatorError::EmptyHistory)?;
        match side {
            Side::Reference => self.reference.pop(),
            Side::Query => self.query.pop(),
        };
        log::debug!("Removed {point:?} from {side}");
        Ok((side, point))
    }

    /// The complete pairs, zipped positionally.
    ///
    /// A trailing unmatched point is left out until its partner is added.
    pub fn current_pairs(&self) -> Vec<PointPair> {
        self.reference
            .iter()
            .zip(self.query.iter())
            .map(|(&reference, &query)| PointPair { reference, query })
            .collect()
    }

    /// Fit the affine transform mapping reference points onto query points.
    pub fn compute_transform(&self) -> Result<AffineTransform, AccumulatorError> {
        self.compute_transform_with(&SolverParams::default())
    }

    /// Fit the affine transform with explicit solver parameters.
    pub fn compute_transform_with(
        &self,
        params: &SolverParams,
    ) -> Result<AffineTransform, AccumulatorError> {
        if self.reference.len() != self.query.len() {
            let err = AccumulatorError::UnbalancedPoints {
                reference: self.reference.len(),
                query: self.query.len(),
            };
            log::error!("{err}");
            return Err(err);
        }
        let matrix = solver::solve_affine_with(&self.reference, &self.query, params)?;
        Ok(AffineTransform::from_matrix(&matrix)?)
    }

    /// Fit the transform and bundle it with the serializable record.
    pub fn export_record(&self) -> Result<RegistrationExport, AccumulatorError> {
        let transform = self.compute_transform()?;

        let coordinates = self
            .current_pairs()
            .into_iter()
            .map(|pair| CoordinateRecord {
                barcode_left: self.reference_id.clone(),
                barcode_right: self.query_id.clone(),
                left_x: pair.reference[0],
                left_y: pair.reference[1],
                right_x: pair.query[0],
                right_y: pair.query[1],
            })
            .collect();

        let record = RegistrationRecord {
            barcode_query: self.query_id.clone(),
            barcode_reference: self.reference_id.clone(),
            matrix: Some(transform.to_matrix().iter().map(|row| row.to_vec()).collect()),
            coordinates,
            parameters: Some(transform.to_parameters()),
        };

        Ok(RegistrationExport { transform, record })
    }
}
