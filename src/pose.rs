//! Pose estimates and noise parameter points

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One object's estimated 6-DoF pose as stored in a feature archive.
///
/// Rotation is in axis-angle form: the direction is the rotation axis and the
/// magnitude is the angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Translation vector `(tx, ty, tz)`
    pub translation: [f64; 3],
    /// Axis-angle rotation vector `(rx, ry, rz)`
    pub rotation: [f64; 3],
}

impl PoseEstimate {
    /// Number of `f64` components in a pose.
    pub const COMPONENTS: usize = 6;

    /// Create a pose from translation and rotation vectors.
    #[must_use]
    pub const fn new(translation: [f64; 3], rotation: [f64; 3]) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Identity pose at the origin.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new([0.0; 3], [0.0; 3])
    }

    /// Components in storage order `tx ty tz rx ry rz`.
    #[must_use]
    pub const fn to_components(&self) -> [f64; 6] {
        let [tx, ty, tz] = self.translation;
        let [rx, ry, rz] = self.rotation;
        [tx, ty, tz, rx, ry, rz]
    }

    /// Inverse of [`to_components`](Self::to_components).
    #[must_use]
    pub const fn from_components(c: [f64; 6]) -> Self {
        Self::new([c[0], c[1], c[2]], [c[3], c[4], c[5]])
    }

    /// Whether every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_components().iter().all(|c| c.is_finite())
    }

    /// Bitwise equality, distinguishing `0.0` from `-0.0`.
    #[must_use]
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.to_components()
            .iter()
            .zip(other.to_components().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// One grid cell: standard deviations of translation and rotation noise.
///
/// Both values are finite and non-negative; construction through
/// [`ParameterPoint::new`] enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterPoint {
    stddev_t: f64,
    stddev_r: f64,
}

impl ParameterPoint {
    /// The zero/zero baseline.
    pub const BASELINE: Self = Self {
        stddev_t: 0.0,
        stddev_r: 0.0,
    };

    /// Create a point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoiseApplication`] if either value is negative or not finite.
    pub fn new(stddev_t: f64, stddev_r: f64) -> Result<Self> {
        for (name, value) in [("stddev_t", stddev_t), ("stddev_r", stddev_r)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::NoiseApplication(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        // Normalize -0.0 so that equality and output formatting agree.
        Ok(Self {
            stddev_t: stddev_t + 0.0,
            stddev_r: stddev_r + 0.0,
        })
    }

    /// Translation standard deviation.
    #[must_use]
    pub const fn stddev_t(&self) -> f64 {
        self.stddev_t
    }

    /// Rotation standard deviation (radians).
    #[must_use]
    pub const fn stddev_r(&self) -> f64 {
        self.stddev_r
    }

    /// Whether this is the `(0, 0)` baseline.
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        self.stddev_t == 0.0 && self.stddev_r == 0.0
    }

    /// Bit-level key usable for de-duplication.
    #[must_use]
    pub const fn key(&self) -> (u64, u64) {
        (self.stddev_t.to_bits(), self.stddev_r.to_bits())
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.stddev_t, self.stddev_r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_roundtrip_order() {
        let pose = PoseEstimate::new([1.0, 2.0, 3.0], [0.1, 0.2, 0.3]);
        assert_eq!(pose.to_components(), [1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);
        assert_eq!(PoseEstimate::from_components(pose.to_components()), pose);
    }

    #[test]
    fn test_parameter_point_rejects_negative_and_nan() {
        assert!(ParameterPoint::new(-0.1, 0.0).is_err());
        assert!(ParameterPoint::new(0.0, f64::NAN).is_err());
        assert!(ParameterPoint::new(f64::INFINITY, 0.0).is_err());
        assert!(ParameterPoint::new(0.0, 0.0).unwrap().is_baseline());
    }

    #[test]
    fn test_negative_zero_normalized() {
        let p = ParameterPoint::new(-0.0, 0.0).unwrap();
        assert_eq!(p.key(), ParameterPoint::BASELINE.key());
        assert_eq!(p.to_string(), "(0, 0)");
    }

    #[test]
    fn test_bitwise_eq_distinguishes_signed_zero() {
        let a = PoseEstimate::new([0.0; 3], [0.0; 3]);
        let b = PoseEstimate::new([-0.0, 0.0, 0.0], [0.0; 3]);
        assert_eq!(a, b);
        assert!(!a.bitwise_eq(&b));
    }
}
