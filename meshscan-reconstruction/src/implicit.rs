//! Moving least squares implicit surface estimator
//!
//! Implements the point-set surface of Guennebaud and Gross: around a query
//! point `x`, neighbor positions and normals are averaged with a compactly
//! supported kernel, and the field value is the signed distance from `x` to
//! the plane through the averaged position with the averaged normal.
//! Positive values lie on the side the normals point to.

use crate::octree::Octree;
use meshscan_core::{BoundingBox, Point3f, ScanPoint, Vector3f};

/// Smallest total kernel weight treated as support
const MIN_TOTAL_WEIGHT: f32 = f32::MIN_POSITIVE;

/// Smallest averaged normal length that can be rescaled to unit length
const MIN_NORMAL_LENGTH: f32 = 1e-6;

/// Compactly supported kernel `(1 - (d/r)²)⁴`, zero from `d = r` on.
///
/// Approximates a Gaussian of width `r` and is non-increasing on `[0, r]`.
pub fn wendland_weight(distance: f32, radius: f32) -> f32 {
    if distance >= radius {
        return 0.0;
    }
    let q = distance / radius;
    (1.0 - q * q).powi(4)
}

/// Weighted sums over the samples around a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighborhood {
    pub total_weight: f32,
    pub weighted_position: Vector3f,
    pub weighted_normal: Vector3f,
    /// Samples with non-zero weight
    pub support: usize,
}

impl Neighborhood {
    fn empty() -> Self {
        Self {
            total_weight: 0.0,
            weighted_position: Vector3f::zeros(),
            weighted_normal: Vector3f::zeros(),
            support: 0,
        }
    }

    /// Whether any sample contributed weight
    pub fn has_support(&self) -> bool {
        self.total_weight >= MIN_TOTAL_WEIGHT
    }

    /// Weighted average position, `None` without support
    pub fn mean_position(&self) -> Option<Point3f> {
        self.has_support()
            .then(|| Point3f::from(self.weighted_position / self.total_weight))
    }

    /// Weighted average normal, `None` without support
    pub fn mean_normal(&self) -> Option<Vector3f> {
        self.has_support()
            .then(|| self.weighted_normal / self.total_weight)
    }
}

/// Implicit surface over a frozen octree snapshot
#[derive(Debug, Clone, Copy)]
pub struct ImplicitSurface<'a> {
    tree: &'a Octree<ScanPoint>,
    radius: f32,
}

impl<'a> ImplicitSurface<'a> {
    /// `radius` is the kernel bandwidth, the same value as the vicinity radius
    pub fn new(tree: &'a Octree<ScanPoint>, radius: f32) -> Self {
        Self { tree, radius }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Snapshot the field is evaluated on
    pub fn tree(&self) -> &'a Octree<ScanPoint> {
        self.tree
    }

    /// Accumulate kernel-weighted positions and normals around `x`
    pub fn neighborhood(&self, x: &Point3f) -> Neighborhood {
        let range = BoundingBox::around(*x, self.radius);
        let mut acc = Neighborhood::empty();

        for point in self.tree.query(&range) {
            let weight = wendland_weight((x - point.position).norm(), self.radius);
            if weight <= 0.0 {
                continue;
            }
            acc.total_weight += weight;
            acc.weighted_position += point.position.coords * weight;
            acc.weighted_normal += point.normal * weight;
            acc.support += 1;
        }

        acc
    }

    /// Signed distance to the locally fitted plane, `None` when no sample lies
    /// within the radius
    pub fn try_scalar_field(&self, x: &Point3f) -> Option<f32> {
        let neighborhood = self.neighborhood(x);
        let position = neighborhood.mean_position()?;
        let normal = neighborhood.mean_normal()?;
        Some(normal.dot(&(x - position)))
    }

    /// Signed distance to the locally fitted plane, 0 without support
    pub fn scalar_field(&self, x: &Point3f) -> f32 {
        self.try_scalar_field(x).unwrap_or(0.0)
    }

    /// Unit-length weighted average normal, `None` without support or when
    /// the neighbor normals cancel out
    pub fn try_normal_field(&self, x: &Point3f) -> Option<Vector3f> {
        self.neighborhood(x)
            .mean_normal()?
            .try_normalize(MIN_NORMAL_LENGTH)
    }

    /// Unit-length weighted average normal, `fallback` where undefined
    pub fn normal_field(&self, x: &Point3f, fallback: Vector3f) -> Vector3f {
        self.try_normal_field(x).unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_tree() -> Octree<ScanPoint> {
        // z = 0 plane sampled every 0.05, normals +z
        let bounds = BoundingBox::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let mut tree = Octree::new(bounds, 1e-4).unwrap();
        for i in -10..=10 {
            for j in -10..=10 {
                let p = Point3f::new(i as f32 * 0.05, j as f32 * 0.05, 0.0);
                tree.insert(ScanPoint::new(p, Vector3f::z()), p).unwrap();
            }
        }
        tree
    }

    #[test]
    fn test_weight_at_center_and_boundary() {
        assert_relative_eq!(wendland_weight(0.0, 0.5), 1.0);
        assert_eq!(wendland_weight(0.5, 0.5), 0.0);
        assert_eq!(wendland_weight(0.7, 0.5), 0.0);
    }

    #[test]
    fn test_weight_is_monotone() {
        let r = 0.05;
        let mut previous = wendland_weight(0.0, r);
        for i in 1..=100 {
            let d = r * i as f32 / 100.0;
            let w = wendland_weight(d, r);
            assert!(w <= previous, "w({}) = {} > {}", d, w, previous);
            assert!(w >= 0.0);
            previous = w;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_scalar_field_is_signed_distance_to_plane() {
        let tree = plane_tree();
        let surface = ImplicitSurface::new(&tree, 0.12);

        assert_relative_eq!(surface.scalar_field(&Point3f::new(0.0, 0.0, 0.05)), 0.05, epsilon = 1e-5);
        assert_relative_eq!(surface.scalar_field(&Point3f::new(0.1, -0.1, -0.03)), -0.03, epsilon = 1e-5);
        assert_relative_eq!(surface.scalar_field(&Point3f::new(0.02, 0.03, 0.0)), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_field_is_unit() {
        let tree = plane_tree();
        let surface = ImplicitSurface::new(&tree, 0.12);
        let n = surface.try_normal_field(&Point3f::new(0.0, 0.0, 0.02)).unwrap();
        assert_relative_eq!(n, Vector3f::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_no_support_is_defined() {
        let tree = plane_tree();
        let surface = ImplicitSurface::new(&tree, 0.12);
        let far = Point3f::new(0.0, 0.0, 0.9);

        assert!(surface.try_scalar_field(&far).is_none());
        assert_eq!(surface.scalar_field(&far), 0.0);
        assert!(surface.try_normal_field(&far).is_none());
        assert_eq!(surface.normal_field(&far, Vector3f::x()), Vector3f::x());
        assert!(!surface.neighborhood(&far).has_support());
    }

    #[test]
    fn test_cancelling_normals_have_no_direction() {
        let bounds = BoundingBox::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let mut tree = Octree::new(bounds, 1e-4).unwrap();
        let a = Point3f::new(0.01, 0.0, 0.0);
        let b = Point3f::new(-0.01, 0.0, 0.0);
        tree.insert(ScanPoint::new(a, Vector3f::x()), a).unwrap();
        tree.insert(ScanPoint::new(b, -Vector3f::x()), b).unwrap();

        let surface = ImplicitSurface::new(&tree, 0.1);
        assert!(surface.try_normal_field(&Point3f::origin()).is_none());
        assert_eq!(surface.neighborhood(&Point3f::origin()).support, 2);
    }
}
