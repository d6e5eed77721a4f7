//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A single sample from a depth capture session.
///
/// Identity is positional: two samples compare equal when they sit at the
/// same position, regardless of normal, color or confidence. The octree
/// relies on this to bucket and remove samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanPoint {
    pub position: Point3f,
    /// Unit surface normal
    pub normal: Vector3f,
    /// Linear RGB color in `[0, 1]`
    pub color: Option<Vector3f>,
    /// Sensor confidence reported by the capture session
    pub confidence: Option<f32>,
}

impl ScanPoint {
    /// Create a point with position and normal only
    pub fn new(position: Point3f, normal: Vector3f) -> Self {
        Self {
            position,
            normal,
            color: None,
            confidence: None,
        }
    }

    /// Attach a color
    pub fn with_color(mut self, color: Vector3f) -> Self {
        self.color = Some(color);
        self
    }

    /// Attach a confidence value
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// A new point carrying the same attributes at another position and normal
    pub fn moved_to(&self, position: Point3f, normal: Vector3f) -> Self {
        Self {
            position,
            normal,
            ..*self
        }
    }

    /// Whether position and normal are free of NaN/infinity
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite()) && self.normal.iter().all(|c| c.is_finite())
    }
}

impl PartialEq for ScanPoint {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl Default for ScanPoint {
    fn default() -> Self {
        Self::new(Point3f::origin(), Vector3f::new(0.0, 0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_positional() {
        let a = ScanPoint::new(Point3f::new(1.0, 2.0, 3.0), Vector3f::x());
        let b = ScanPoint::new(Point3f::new(1.0, 2.0, 3.0), Vector3f::y()).with_confidence(0.5);
        let c = ScanPoint::new(Point3f::new(1.0, 2.0, 3.5), Vector3f::x());

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_moved_to_keeps_attributes() {
        let p = ScanPoint::default()
            .with_color(Vector3f::new(1.0, 0.0, 0.0))
            .with_confidence(2.0);
        let moved = p.moved_to(Point3f::new(0.0, 0.0, 1.0), Vector3f::y());

        assert_eq!(moved.color, p.color);
        assert_eq!(moved.confidence, Some(2.0));
        assert_eq!(moved.normal, Vector3f::y());
    }

    #[test]
    fn test_is_finite() {
        let mut p = ScanPoint::default();
        assert!(p.is_finite());
        p.normal.x = f32::NAN;
        assert!(!p.is_finite());
    }
}
