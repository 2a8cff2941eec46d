//! Parameter grid planning
//!
//! The sweep is bounded by wall-clock time: every grid point costs one
//! recognition run against the noisy base, plus one run against the original
//! base that is paid once and cached, so the grid holds
//! `floor(budget / cost) - 1` points (at least one).
//!
//! Points are emitted in priority order so that a truncated or interrupted
//! sweep still covers the most informative cells:
//!
//! 1. the `(0, 0)` baseline
//! 2. small single-axis points `(small_t, 0)`, `(0, small_r)`
//! 3. single-axis stress points `(max_t, 0)`, `(0, max_r)`
//! 4. joint stress `(max_t, max_r)`
//! 5. interior lattice points, coarse to fine
//!
//! A tighter budget drops interior points first.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pose::ParameterPoint;
use crate::{Error, Result};

/// Upper bound on [`GridPlannerConfig::levels`]; the lattice is enumerated in full.
pub const MAX_LEVELS: usize = 64;

/// Magnitudes that shape the planned grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPlannerConfig {
    /// Smallest non-zero translation stddev
    #[serde(default = "GridPlannerConfig::default_small_t")]
    pub small_t: f64,
    /// Translation stddev expected to collapse recognition
    #[serde(default = "GridPlannerConfig::default_max_t")]
    pub max_t: f64,
    /// Smallest non-zero rotation stddev (radians)
    #[serde(default = "GridPlannerConfig::default_small_r")]
    pub small_r: f64,
    /// Rotation stddev expected to collapse recognition (radians)
    #[serde(default = "GridPlannerConfig::default_max_r")]
    pub max_r: f64,
    /// Non-zero lattice levels per axis, geometric from `small` to `max`
    #[serde(default = "GridPlannerConfig::default_levels")]
    pub levels: usize,
}

impl GridPlannerConfig {
    const fn default_small_t() -> f64 {
        0.005
    }
    const fn default_max_t() -> f64 {
        0.2
    }
    const fn default_small_r() -> f64 {
        0.02
    }
    const fn default_max_r() -> f64 {
        1.0
    }
    const fn default_levels() -> usize {
        8
    }

    /// Check magnitudes are finite, positive and ordered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] otherwise.
    pub fn validate(&self) -> Result<()> {
        for (name, small, max) in [
            ("translation", self.small_t, self.max_t),
            ("rotation", self.small_r, self.max_r),
        ] {
            if !(small.is_finite() && max.is_finite() && small > 0.0 && max >= small) {
                return Err(Error::Configuration(format!(
                    "{name} grid magnitudes must satisfy 0 < small <= max, got small={small} max={max}"
                )));
            }
        }
        if !(2..=MAX_LEVELS).contains(&self.levels) {
            return Err(Error::Configuration(format!(
                "grid needs between 2 and {MAX_LEVELS} levels per axis, got {}",
                self.levels
            )));
        }
        Ok(())
    }

    /// Geometric ladder `0, small, ..., max` with `levels` non-zero steps.
    fn ladder(&self, small: f64, max: f64) -> Vec<f64> {
        let steps = self.levels - 1;
        #[allow(clippy::cast_precision_loss)]
        let ratio = (max / small).powf(1.0 / steps as f64);
        let mut out = Vec::with_capacity(self.levels + 1);
        out.push(0.0);
        let mut v = small;
        for i in 0..self.levels {
            out.push(if i == steps { max } else { v });
            v *= ratio;
        }
        out
    }
}

impl Default for GridPlannerConfig {
    fn default() -> Self {
        Self {
            small_t: Self::default_small_t(),
            max_t: Self::default_max_t(),
            small_r: Self::default_small_r(),
            max_r: Self::default_max_r(),
            levels: Self::default_levels(),
        }
    }
}

/// Budget-bounded grid generator.
#[derive(Debug, Clone)]
pub struct ParameterGridGenerator {
    budget: Duration,
    per_point_cost: Duration,
    config: GridPlannerConfig,
}

impl ParameterGridGenerator {
    /// Create a generator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `per_point_cost` is zero or the
    /// planner config is invalid.
    pub fn new(budget: Duration, per_point_cost: Duration, config: GridPlannerConfig) -> Result<Self> {
        if per_point_cost.is_zero() {
            return Err(Error::Configuration("per-point cost must be positive".into()));
        }
        config.validate()?;
        Ok(Self {
            budget,
            per_point_cost,
            config,
        })
    }

    /// Number of points that fit in the budget (never less than one).
    #[must_use]
    pub fn capacity(&self) -> usize {
        let runs = self.budget.as_nanos() / self.per_point_cost.as_nanos();
        // One run is reserved for the cached original-base recognition.
        usize::try_from(runs.saturating_sub(1)).unwrap_or(usize::MAX).max(1)
    }

    /// Produce the grid in priority order.
    #[must_use]
    pub fn generate(&self) -> Vec<ParameterPoint> {
        let capacity = self.capacity();
        let mut grid = Vec::with_capacity(capacity.min(self.lattice_size()));
        let mut seen = HashSet::new();
        for point in self.candidates() {
            if grid.len() == capacity {
                break;
            }
            if seen.insert(point.key()) {
                grid.push(point);
            }
        }
        grid
    }

    fn lattice_size(&self) -> usize {
        (self.config.levels + 1) * (self.config.levels + 1)
    }

    fn candidates(&self) -> Vec<ParameterPoint> {
        let c = &self.config;
        let ts = c.ladder(c.small_t, c.max_t);
        let rs = c.ladder(c.small_r, c.max_r);

        let mut out = vec![
            Ok(ParameterPoint::BASELINE),
            ParameterPoint::new(c.small_t, 0.0),
            ParameterPoint::new(0.0, c.small_r),
            ParameterPoint::new(c.max_t, 0.0),
            ParameterPoint::new(0.0, c.max_r),
            ParameterPoint::new(c.max_t, c.max_r),
        ]
        .into_iter()
        .filter_map(Result::ok)
        .collect::<Vec<_>>();

        let rank = bisection_rank(c.levels);
        let mut lattice: Vec<(usize, usize)> = (0..=c.levels)
            .flat_map(|i| (0..=c.levels).map(move |j| (i, j)))
            .collect();
        // Coarse-to-fine: by the finer of the two axis ranks, then by the sum.
        lattice.sort_by_key(|&(i, j)| (rank[i].max(rank[j]), rank[i] + rank[j], i, j));
        out.extend(
            lattice
                .into_iter()
                .filter_map(|(i, j)| ParameterPoint::new(ts[i], rs[j]).ok()),
        );
        out
    }
}

/// Rank of each index in `0..=n` under bisection order
/// (`0, n, n/2, n/4, 3n/4, ...`); lower rank means coarser.
fn bisection_rank(n: usize) -> Vec<usize> {
    let mut rank = vec![usize::MAX; n + 1];
    let mut next = 0;
    rank[0] = next;
    next += 1;
    if n > 0 {
        rank[n] = next;
        next += 1;
    }
    let mut intervals = vec![(0, n)];
    while !intervals.is_empty() {
        let mut finer = Vec::with_capacity(intervals.len() * 2);
        for (lo, hi) in intervals {
            if hi - lo < 2 {
                continue;
            }
            let mid = lo + (hi - lo) / 2;
            rank[mid] = next;
            next += 1;
            finer.push((lo, mid));
            finer.push((mid, hi));
        }
        intervals = finer;
    }
    rank
}

/// The three-point smoke-test grid `(0,0), (1,1), (2,2)`.
#[must_use]
pub fn smoke_test_grid() -> Vec<ParameterPoint> {
    [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]
        .into_iter()
        .filter_map(|(t, r)| ParameterPoint::new(t, r).ok())
        .collect()
}

/// Validate an explicit grid override.
///
/// # Errors
///
/// Returns [`Error::Configuration`] on an empty list, an invalid value or a
/// duplicate point.
pub fn explicit_grid(pairs: &[(f64, f64)]) -> Result<Vec<ParameterPoint>> {
    if pairs.is_empty() {
        return Err(Error::Configuration("explicit grid is empty".into()));
    }
    let mut seen = HashSet::new();
    pairs
        .iter()
        .map(|&(t, r)| {
            let point =
                ParameterPoint::new(t, r).map_err(|e| Error::Configuration(e.to_string()))?;
            if !seen.insert(point.key()) {
                return Err(Error::Configuration(format!("duplicate grid point {point}")));
            }
            Ok(point)
        })
        .collect()
}

/// Parse `"t:r,t:r,..."` into pairs.
///
/// # Errors
///
/// Returns [`Error::Configuration`] on malformed input.
pub fn parse_grid(text: &str) -> Result<Vec<(f64, f64)>> {
    text.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let (t, r) = pair.split_once(':').ok_or_else(|| {
                Error::Configuration(format!("grid point '{pair}' must look like t:r"))
            })?;
            let parse = |s: &str| {
                s.trim().parse::<f64>().map_err(|e| {
                    Error::Configuration(format!("grid point '{pair}': {e}"))
                })
            };
            Ok((parse(t)?, parse(r)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(budget_min: u64) -> ParameterGridGenerator {
        ParameterGridGenerator::new(
            Duration::from_secs(budget_min * 60),
            Duration::from_secs(120),
            GridPlannerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_budget_capacity() {
        assert_eq!(generator(120).capacity(), 59);
        assert_eq!(generator(120).generate().len(), 59);
    }

    #[test]
    fn test_tiny_budget_still_has_baseline() {
        let grid = generator(0).generate();
        assert_eq!(grid, vec![ParameterPoint::BASELINE]);
    }

    #[test]
    fn test_priority_prefix() {
        let c = GridPlannerConfig::default();
        let grid = generator(60 * 24).generate();
        let expected = [
            (0.0, 0.0),
            (c.small_t, 0.0),
            (0.0, c.small_r),
            (c.max_t, 0.0),
            (0.0, c.max_r),
            (c.max_t, c.max_r),
        ];
        for (p, (t, r)) in grid.iter().zip(expected) {
            assert_eq!((p.stddev_t(), p.stddev_r()), (t, r));
        }
        // Large budget covers the whole lattice exactly once.
        assert_eq!(grid.len(), 81);
    }

    #[test]
    fn test_grid_shrinks_with_budget() {
        let mut prev = usize::MAX;
        for minutes in (0..=200).rev().step_by(7) {
            let len = generator(minutes).generate().len();
            assert!(len <= prev);
            prev = len;
        }
    }

    #[test]
    fn test_ladder_endpoints() {
        let c = GridPlannerConfig::default();
        let ladder = c.ladder(c.small_t, c.max_t);
        assert_eq!(ladder.len(), c.levels + 1);
        assert_eq!(ladder[0], 0.0);
        assert_eq!(ladder[1], c.small_t);
        assert_eq!(ladder[c.levels], c.max_t);
        assert!(ladder.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bisection_rank_is_permutation() {
        let rank = bisection_rank(8);
        let mut sorted = rank.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..=8).collect::<Vec<_>>());
        assert_eq!(rank[0], 0);
        assert_eq!(rank[8], 1);
        assert_eq!(rank[4], 2);
    }

    #[test]
    fn test_parse_and_explicit_grid() {
        let pairs = parse_grid("0:0, 1:1,2:2").unwrap();
        assert_eq!(explicit_grid(&pairs).unwrap(), smoke_test_grid());
        assert!(parse_grid("1;2").is_err());
        assert!(explicit_grid(&[(0.0, 0.0), (0.0, 0.0)]).is_err());
        assert!(explicit_grid(&[(-1.0, 0.0)]).is_err());
        assert!(explicit_grid(&[]).is_err());
    }

    #[test]
    fn test_invalid_planner_config() {
        let config = GridPlannerConfig {
            small_t: 0.0,
            ..GridPlannerConfig::default()
        };
        assert!(ParameterGridGenerator::new(Duration::from_secs(1), Duration::from_secs(1), config).is_err());
        assert!(ParameterGridGenerator::new(
            Duration::from_secs(1),
            Duration::ZERO,
            GridPlannerConfig::default()
        )
        .is_err());
    }

    #[test]
    fn test_levels_bounded() {
        let huge = GridPlannerConfig {
            levels: 100_000,
            ..GridPlannerConfig::default()
        };
        let err = ParameterGridGenerator::new(Duration::from_secs(600), Duration::from_secs(120), huge)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let widest = GridPlannerConfig {
            levels: MAX_LEVELS,
            ..GridPlannerConfig::default()
        };
        let grid = ParameterGridGenerator::new(Duration::from_secs(600), Duration::from_secs(120), widest)
            .unwrap()
            .generate();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0], ParameterPoint::BASELINE);
    }
}
