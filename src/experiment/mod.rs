//! Sweep bookkeeping
//!
//! The result dataset only holds completed points. This module keeps the
//! rest of the story: which grid was planned, the noise seed of each point,
//! and why a point was skipped.
//!
//! ## Schema Overview
//!
//! ```text
//! SweepManifest (1) ──< PointRecord (N, one per grid point)
//!                            │
//!                            └── ResultRow (0..1)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use posesweep::experiment::{PointStatus, SweepManifest};
//! use posesweep::grid::smoke_test_grid;
//!
//! let grid = smoke_test_grid();
//! let mut manifest = SweepManifest::new("sweep-001", 42, &grid);
//!
//! if let Some(record) = manifest.point_mut(0) {
//!     record.start();
//! }
//! manifest.cancel_pending();
//! assert_eq!(manifest.with_status(PointStatus::Cancelled).count(), 2);
//! ```

mod manifest;
mod point_record;

pub use manifest::{SweepManifest, SweepManifestBuilder};
pub use point_record::{PointRecord, PointStatus};
