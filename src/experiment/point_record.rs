//! Point Record - lifecycle of one grid point within a sweep

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::pose::ParameterPoint;
use crate::sink::ResultRow;

/// Status of a grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointStatus {
    /// Not yet attempted.
    Pending,
    /// Currently being processed.
    Running,
    /// Row written to the dataset.
    Completed,
    /// Dropped after a recoverable failure; no row was written.
    Skipped,
    /// Never attempted because the sweep was cancelled.
    Cancelled,
}

/// Point Record tracks one grid point from planning to its final status.
///
/// The derived noise seed is stored so a single point can be reproduced in
/// isolation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointRecord {
    index: usize,
    point: ParameterPoint,
    seed: u64,
    status: PointStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error_kind: Option<ErrorKind>,
    error: Option<String>,
    row: Option<ResultRow>,
}

impl PointRecord {
    /// Create a record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `index` - Position in the grid
    /// * `point` - Noise parameters
    /// * `seed` - Noise seed for this point
    #[must_use]
    pub const fn new(index: usize, point: ParameterPoint, seed: u64) -> Self {
        Self {
            index,
            point,
            seed,
            status: PointStatus::Pending,
            started_at: None,
            ended_at: None,
            error_kind: None,
            error: None,
            row: None,
        }
    }

    /// Grid index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Noise parameters.
    #[must_use]
    pub const fn point(&self) -> ParameterPoint {
        self.point
    }

    /// Noise seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> PointStatus {
        self.status
    }

    /// Start timestamp, if attempted.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// End timestamp, if finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Error kind of a skipped point.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Error message of a skipped point.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Row written for a completed point.
    #[must_use]
    pub const fn row(&self) -> Option<&ResultRow> {
        self.row.as_ref()
    }

    /// Transition to Running.
    pub fn start(&mut self) {
        self.status = PointStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition to Completed.
    pub fn complete(&mut self, row: ResultRow) {
        self.status = PointStatus::Completed;
        self.row = Some(row);
        self.ended_at = Some(Utc::now());
    }

    /// Transition to Skipped.
    pub fn skip(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.status = PointStatus::Skipped;
        self.error_kind = Some(kind);
        self.error = Some(message.into());
        self.ended_at = Some(Utc::now());
    }

    /// Transition to Cancelled.
    pub fn cancel(&mut self) {
        self.status = PointStatus::Cancelled;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::RecognitionCounts;

    #[test]
    fn test_point_status_default() {
        let record = PointRecord::new(0, ParameterPoint::BASELINE, 9);
        assert_eq!(record.status(), PointStatus::Pending);
        assert!(record.started_at().is_none());
    }

    #[test]
    fn test_point_lifecycle() {
        let mut record = PointRecord::new(1, ParameterPoint::BASELINE, 9);
        record.start();
        assert_eq!(record.status(), PointStatus::Running);
        let counts = RecognitionCounts::new(3, 1);
        record.complete(ResultRow::new(ParameterPoint::BASELINE, counts, counts));
        assert_eq!(record.status(), PointStatus::Completed);
        assert!(record.ended_at() >= record.started_at());
        assert_eq!(record.row().map(|r| r.noisy_tp), Some(3));
    }

    #[test]
    fn test_point_skip_records_error() {
        let mut record = PointRecord::new(2, ParameterPoint::BASELINE, 9);
        record.start();
        record.skip(ErrorKind::ExternalProcess, "timed out");
        assert_eq!(record.status(), PointStatus::Skipped);
        assert_eq!(record.error_kind(), Some(ErrorKind::ExternalProcess));
        assert_eq!(record.error(), Some("timed out"));
        assert!(record.row().is_none());
    }
}
