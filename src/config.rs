//! Sweep configuration
//!
//! Loaded from an optional JSON file; the binary then overrides individual
//! fields from command-line flags before calling [`SweepConfig::validate`].
//!
//! ```json
//! {
//!   "original_base": "bases/original",
//!   "noisy_base": "bases/noisy",
//!   "test_set": "data/test",
//!   "output": "results.csv",
//!   "budget_secs": 7200,
//!   "recognizer": { "program": "./recognize", "args": ["--base", "{base}", "{test_set}"] }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grid::{explicit_grid, GridPlannerConfig, ParameterGridGenerator};
use crate::pose::ParameterPoint;
use crate::recognizer::RecognizerConfig;
use crate::{Error, Result};

/// Everything a sweep needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Read-only training base
    #[serde(default)]
    pub original_base: Option<PathBuf>,
    /// Working copy rewritten once per point
    #[serde(default)]
    pub noisy_base: Option<PathBuf>,
    /// Test set handed to the recognizer
    #[serde(default)]
    pub test_set: Option<PathBuf>,
    /// Result dataset (CSV)
    #[serde(default = "SweepConfig::default_output")]
    pub output: PathBuf,
    /// Sweep manifest (JSON)
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Total wall-clock budget
    #[serde(default = "SweepConfig::default_budget_secs")]
    pub budget_secs: u64,
    /// Expected cost of one recognition run
    #[serde(default = "SweepConfig::default_per_point_cost_secs")]
    pub per_point_cost_secs: u64,
    /// Master noise seed; drawn from entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Explicit `[stddev_t, stddev_r]` points, bypassing planning
    #[serde(default)]
    pub grid: Option<Vec<[f64; 2]>>,
    /// Grid planner magnitudes
    #[serde(default)]
    pub planner: GridPlannerConfig,
    /// Recognition engine invocation
    #[serde(default)]
    pub recognizer: Option<RecognizerConfig>,
}

impl SweepConfig {
    fn default_output() -> PathBuf {
        PathBuf::from("results.csv")
    }
    const fn default_budget_secs() -> u64 {
        7200
    }
    const fn default_per_point_cost_secs() -> u64 {
        120
    }

    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Configuration(format!("cannot parse config {}: {e}", path.display()))
        })
    }

    /// Check that a sweep can be started with this configuration.
    ///
    /// Paths are only checked for presence here; [`crate::base::Base::open`]
    /// checks them on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("original_base", &self.original_base),
            ("noisy_base", &self.noisy_base),
            ("test_set", &self.test_set),
        ] {
            if value.is_none() {
                return Err(Error::Configuration(format!("{name} is not set")));
            }
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::Configuration("output path is empty".into()));
        }
        if self.recognizer.is_none() {
            return Err(Error::Configuration("recognizer program is not set".into()));
        }
        self.grid().map(|_| ())
    }

    /// The grid to sweep: the explicit override if set, otherwise planned
    /// from the budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid explicit point, a
    /// duplicate point, or invalid budget or planner settings.
    pub fn grid(&self) -> Result<Vec<ParameterPoint>> {
        if let Some(points) = &self.grid {
            let pairs: Vec<(f64, f64)> = points.iter().map(|[t, r]| (*t, *r)).collect();
            return explicit_grid(&pairs);
        }
        let generator = ParameterGridGenerator::new(
            Duration::from_secs(self.budget_secs),
            Duration::from_secs(self.per_point_cost_secs),
            self.planner,
        )?;
        Ok(generator.generate())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            original_base: None,
            noisy_base: None,
            test_set: None,
            output: Self::default_output(),
            manifest: None,
            budget_secs: Self::default_budget_secs(),
            per_point_cost_secs: Self::default_per_point_cost_secs(),
            seed: None,
            grid: None,
            planner: GridPlannerConfig::default(),
            recognizer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> SweepConfig {
        SweepConfig {
            original_base: Some("orig".into()),
            noisy_base: Some("noisy".into()),
            test_set: Some("test".into()),
            recognizer: Some(RecognizerConfig::new("recognize")),
            ..SweepConfig::default()
        }
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: SweepConfig =
            serde_json::from_str(r#"{"recognizer": {"program": "rec"}}"#).unwrap();
        assert_eq!(cfg.budget_secs, 7200);
        assert_eq!(cfg.per_point_cost_secs, 120);
        assert_eq!(cfg.output, PathBuf::from("results.csv"));
        assert_eq!(cfg.planner, GridPlannerConfig::default());
        assert_eq!(cfg.recognizer.unwrap().timeout_secs, 600);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(&path, r#"{"budget_secs": 600, "grid": [[0, 0], [1, 1]]}"#).unwrap();
        let cfg = SweepConfig::load(&path).unwrap();
        assert_eq!(cfg.budget_secs, 600);
        assert_eq!(cfg.grid().unwrap().len(), 2);
    }

    #[test]
    fn test_load_bad_json_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SweepConfig::load(&path), Err(Error::Configuration(_))));
        assert!(matches!(
            SweepConfig::load(dir.path().join("missing.json")),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_requires_paths_and_recognizer() {
        assert!(complete().validate().is_ok());

        let mut cfg = complete();
        cfg.noisy_base = None;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("noisy_base"));

        let mut cfg = complete();
        cfg.recognizer = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_explicit_grid() {
        let mut cfg = complete();
        cfg.grid = Some(vec![[0.0, 0.0], [0.0, 0.0]]);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
        cfg.grid = Some(vec![[-1.0, 0.0]]);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_planned_grid_follows_budget() {
        let mut cfg = complete();
        assert_eq!(cfg.grid().unwrap().len(), 59);
        cfg.budget_secs = 60;
        assert_eq!(cfg.grid().unwrap(), vec![ParameterPoint::BASELINE]);
    }
}
