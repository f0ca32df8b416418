//! Geometry helpers for coverage and motion checks.
//!
//! Contains helper functions for:
//! - Planar (x, y) squared distance between two nodes
//! - The safety-range coverage test (inclusive boundary)
//! - The zero-velocity "stationary" test used by both sender and receiver gates

use super::types::Vector3;

/// Default safety range in meters.
pub const DEFAULT_SAFETY_RANGE: f64 = 145.0;

/// Squared planar Euclidean distance in meters².
///
/// The z component is ignored: coverage is judged on the road plane only.
pub fn distance2(a: &Vector3, b: &Vector3) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx * dx + dy * dy
}

/// True unless both planar velocity components are exactly zero.
///
/// A node that has not started moving (or is pausing) is not a candidate
/// for beacon accounting.
pub fn is_moving(velocity: &Vector3) -> bool {
    velocity.x != 0.0 || velocity.y != 0.0
}

/// Squared-distance coverage threshold, fixed once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyRange {
    squared: f64,
}

impl SafetyRange {
    pub fn from_distance(meters: f64) -> Self {
        Self { squared: meters * meters }
    }

    #[cfg(test)]
    pub fn squared(&self) -> f64 {
        self.squared
    }

    /// Inclusive: a receiver exactly on the boundary is in coverage.
    pub fn covers(&self, d2: f64) -> bool {
        d2 <= self.squared
    }

    /// Convenience for the common "are these two positions in coverage" case.
    pub fn covers_pair(&self, a: &Vector3, b: &Vector3) -> bool {
        self.covers(distance2(a, b))
    }
}

impl Default for SafetyRange {
    fn default() -> Self {
        Self::from_distance(DEFAULT_SAFETY_RANGE)
    }
}
