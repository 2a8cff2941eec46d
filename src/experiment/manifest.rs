//! Sweep Manifest - root audit record of one sweep

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PointRecord, PointStatus};
use crate::base::BaseFingerprint;
use crate::noise::derive_seed;
use crate::pose::ParameterPoint;
use crate::Result;

/// Sweep Manifest records what a sweep planned and what became of each point.
///
/// Every grid point has exactly one [`PointRecord`], so skipped and
/// never-attempted points can be reconciled against the dataset, which only
/// holds completed points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepManifest {
    experiment_id: String,
    created_at: DateTime<Utc>,
    master_seed: u64,
    original_fingerprint: Option<BaseFingerprint>,
    config: Option<serde_json::Value>,
    points: Vec<PointRecord>,
}

impl SweepManifest {
    /// Create a manifest with one Pending record per grid point.
    ///
    /// Point seeds are derived from `master_seed` and the grid index.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, master_seed: u64, grid: &[ParameterPoint]) -> Self {
        Self::builder(experiment_id, master_seed, grid).build()
    }

    /// Create a builder for a manifest with optional fields.
    #[must_use]
    pub fn builder(
        experiment_id: impl Into<String>,
        master_seed: u64,
        grid: &[ParameterPoint],
    ) -> SweepManifestBuilder {
        SweepManifestBuilder::new(experiment_id, master_seed, grid)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Master seed all point seeds derive from.
    #[must_use]
    pub const fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Fingerprint of the original base at sweep start, if recorded.
    #[must_use]
    pub const fn original_fingerprint(&self) -> Option<BaseFingerprint> {
        self.original_fingerprint
    }

    /// Sweep configuration, if recorded.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }

    /// All point records in grid order.
    #[must_use]
    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    /// Mutable record of grid index `index`.
    pub fn point_mut(&mut self, index: usize) -> Option<&mut PointRecord> {
        self.points.get_mut(index)
    }

    /// Records with the given status.
    pub fn with_status(&self, status: PointStatus) -> impl Iterator<Item = &PointRecord> {
        self.points.iter().filter(move |p| p.status() == status)
    }

    /// Mark every Pending point Cancelled.
    pub fn cancel_pending(&mut self) {
        for record in &mut self.points {
            if record.status() == PointStatus::Pending {
                record.cancel();
            }
        }
    }

    /// Write the manifest as pretty JSON, atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a manifest written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builder for `SweepManifest`.
#[derive(Debug)]
pub struct SweepManifestBuilder {
    experiment_id: String,
    created_at: DateTime<Utc>,
    master_seed: u64,
    original_fingerprint: Option<BaseFingerprint>,
    config: Option<serde_json::Value>,
    points: Vec<PointRecord>,
}

impl SweepManifestBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, master_seed: u64, grid: &[ParameterPoint]) -> Self {
        let points = grid
            .iter()
            .enumerate()
            .map(|(i, p)| PointRecord::new(i, *p, derive_seed(master_seed, i as u64)))
            .collect();
        Self {
            experiment_id: experiment_id.into(),
            created_at: Utc::now(),
            master_seed,
            original_fingerprint: None,
            config: None,
            points,
        }
    }

    /// Record the original base fingerprint.
    #[must_use]
    pub const fn original_fingerprint(mut self, fingerprint: BaseFingerprint) -> Self {
        self.original_fingerprint = Some(fingerprint);
        self
    }

    /// Record the sweep configuration.
    #[must_use]
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a custom creation timestamp (useful for testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the `SweepManifest`.
    #[must_use]
    pub fn build(self) -> SweepManifest {
        SweepManifest {
            experiment_id: self.experiment_id,
            created_at: self.created_at,
            master_seed: self.master_seed,
            original_fingerprint: self.original_fingerprint,
            config: self.config,
            points: self.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::grid::smoke_test_grid;

    #[test]
    fn test_manifest_one_record_per_point() {
        let grid = smoke_test_grid();
        let manifest = SweepManifest::new("sweep-1", 42, &grid);
        assert_eq!(manifest.points().len(), 3);
        for (i, record) in manifest.points().iter().enumerate() {
            assert_eq!(record.index(), i);
            assert_eq!(record.point(), grid[i]);
            assert_eq!(record.seed(), derive_seed(42, i as u64));
            assert_eq!(record.status(), PointStatus::Pending);
        }
    }

    #[test]
    fn test_cancel_pending_keeps_finished() {
        let mut manifest = SweepManifest::new("sweep-1", 1, &smoke_test_grid());
        let first = manifest.point_mut(0).unwrap();
        first.start();
        first.skip(ErrorKind::Archive, "corrupt");
        manifest.cancel_pending();
        assert_eq!(manifest.with_status(PointStatus::Skipped).count(), 1);
        assert_eq!(manifest.with_status(PointStatus::Cancelled).count(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.manifest.json");
        let manifest = SweepManifest::builder("sweep-2", 7, &smoke_test_grid())
            .config(serde_json::json!({"budget_secs": 7200}))
            .build();
        manifest.save(&path).unwrap();
        assert_eq!(SweepManifest::load(&path).unwrap(), manifest);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
