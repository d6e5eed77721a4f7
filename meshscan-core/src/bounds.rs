//! Axis-aligned bounding boxes

use crate::error::{Error, Result};
use crate::point::{Point3f, Vector3f};
use serde::{Deserialize, Serialize};

/// An axis-aligned box, inclusive on all faces.
///
/// Octants are numbered front/back × left/right × top/bottom, matching the
/// order children are laid out in the octree:
///
/// | index | octant             | x     | y     | z     |
/// |-------|--------------------|-------|-------|-------|
/// | 0     | front left top     | lower | upper | upper |
/// | 1     | front left bottom  | lower | lower | upper |
/// | 2     | front right top    | upper | upper | upper |
/// | 3     | front right bottom | upper | lower | upper |
/// | 4     | back left top      | lower | upper | lower |
/// | 5     | back left bottom   | lower | lower | lower |
/// | 6     | back right top     | upper | upper | lower |
/// | 7     | back right bottom  | upper | lower | lower |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3f,
    pub max: Point3f,
}

/// Octant index bit set when the octant lies on the back (lower z) side
const OCTANT_BACK: usize = 4;
/// Octant index bit set when the octant lies on the right (upper x) side
const OCTANT_RIGHT: usize = 2;
/// Octant index bit set when the octant lies on the bottom (lower y) side
const OCTANT_BOTTOM: usize = 1;

impl BoundingBox {
    /// Create a box from its minimum and maximum corners
    pub fn new(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    /// Create a box centered on `center` extending `half_size` along each axis
    pub fn from_center_half_size(center: Point3f, half_size: Vector3f) -> Self {
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Cube of half-extent `radius` around `center`
    pub fn around(center: Point3f, radius: f32) -> Self {
        Self::from_center_half_size(center, Vector3f::repeat(radius))
    }

    /// Tight bounds of a set of positions, `None` if the set is empty
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3f>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Self::new(first, first);
        for p in iter {
            bounds.min = bounds.min.inf(p);
            bounds.max = bounds.max.sup(p);
        }
        Some(bounds)
    }

    /// Center of the box
    pub fn center(&self) -> Point3f {
        nalgebra::center(&self.min, &self.max)
    }

    /// Edge lengths along each axis
    pub fn size(&self) -> Vector3f {
        self.max - self.min
    }

    /// Half the edge lengths along each axis
    pub fn half_size(&self) -> Vector3f {
        self.size() / 2.0
    }

    /// Shortest edge length
    pub fn min_extent(&self) -> f32 {
        self.size().min()
    }

    /// Whether the box has zero or negative volume, or non-finite corners
    pub fn is_degenerate(&self) -> bool {
        let finite = self.min.iter().chain(self.max.iter()).all(|c| c.is_finite());
        !finite || (0..3).any(|i| self.min[i] >= self.max[i])
    }

    /// Reject degenerate boxes
    pub fn validate(&self) -> Result<()> {
        if self.is_degenerate() {
            return Err(Error::InvalidInput(format!(
                "bounding box [{:?} .. {:?}] has no volume",
                self.min.coords.as_slice(),
                self.max.coords.as_slice()
            )));
        }
        Ok(())
    }

    /// Inclusive point containment
    pub fn contains_point(&self, point: &Point3f) -> bool {
        (0..3).all(|i| self.min[i] <= point[i] && point[i] <= self.max[i])
    }

    /// Whether `other` lies entirely within this box
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        (0..3).all(|i| self.min[i] <= other.min[i] && self.max[i] >= other.max[i])
    }

    /// Whether this box lies entirely within `other`
    pub fn is_contained_in(&self, other: &BoundingBox) -> bool {
        other.contains_box(self)
    }

    /// Exact overlap test using separating axes. Boxes that only touch overlap.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// Approximate overlap test that only checks whether a corner of this box
    /// falls inside `other`.
    ///
    /// Misses configurations where the boxes cross without any corner inside
    /// the other, e.g. two perpendicular slabs. Prefer [`Self::intersects`].
    pub fn intersects_by_corners(&self, other: &BoundingBox) -> bool {
        self.corners().iter().any(|c| other.contains_point(c))
    }

    /// The 8 corners. Bit 0 of the index selects max x, bit 1 max y, bit 2 max z.
    pub fn corners(&self) -> [Point3f; 8] {
        std::array::from_fn(|i| {
            Point3f::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            )
        })
    }

    /// Child box for octant `index` (see the type-level table)
    pub fn octant(&self, index: usize) -> BoundingBox {
        let c = self.center();
        let (min_x, max_x) = if index & OCTANT_RIGHT != 0 {
            (c.x, self.max.x)
        } else {
            (self.min.x, c.x)
        };
        let (min_y, max_y) = if index & OCTANT_BOTTOM != 0 {
            (self.min.y, c.y)
        } else {
            (c.y, self.max.y)
        };
        let (min_z, max_z) = if index & OCTANT_BACK != 0 {
            (self.min.z, c.z)
        } else {
            (c.z, self.max.z)
        };
        BoundingBox::new(
            Point3f::new(min_x, min_y, min_z),
            Point3f::new(max_x, max_y, max_z),
        )
    }

    /// All 8 child boxes in octant order
    pub fn octants(&self) -> [BoundingBox; 8] {
        std::array::from_fn(|i| self.octant(i))
    }

    /// Index of the octant a contained point descends into.
    ///
    /// Points on a splitting plane go to the upper side, which is the side
    /// whose child box includes the plane as its minimum.
    pub fn octant_index(&self, point: &Point3f) -> usize {
        let c = self.center();
        let mut index = 0;
        if point.z < c.z {
            index |= OCTANT_BACK;
        }
        if point.x >= c.x {
            index |= OCTANT_RIGHT;
        }
        if point.y < c.y {
            index |= OCTANT_BOTTOM;
        }
        index
    }

    /// Grow the box by `margin` on every side
    pub fn expanded(&self, margin: f32) -> BoundingBox {
        BoundingBox::new(
            self.min - Vector3f::repeat(margin),
            self.max + Vector3f::repeat(margin),
        )
    }

    /// Nearest point inside the box
    pub fn clamp_point(&self, point: &Point3f) -> Point3f {
        point.sup(&self.min).inf(&self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit() -> BoundingBox {
        BoundingBox::new(Point3f::origin(), Point3f::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_derived_quantities() {
        let b = BoundingBox::new(Point3f::new(-1.0, 0.0, 2.0), Point3f::new(1.0, 4.0, 3.0));
        assert_eq!(b.center(), Point3f::new(0.0, 2.0, 2.5));
        assert_eq!(b.size(), Vector3f::new(2.0, 4.0, 1.0));
        assert_eq!(b.half_size(), Vector3f::new(1.0, 2.0, 0.5));
        assert_relative_eq!(b.min_extent(), 1.0);
    }

    #[test]
    fn test_degenerate() {
        assert!(!unit().is_degenerate());
        let flat = BoundingBox::new(Point3f::origin(), Point3f::new(1.0, 0.0, 1.0));
        assert!(flat.is_degenerate());
        assert!(flat.validate().is_err());
        let inverted = BoundingBox::new(Point3f::new(1.0, 1.0, 1.0), Point3f::origin());
        assert!(inverted.is_degenerate());
        let nan = BoundingBox::new(Point3f::new(f32::NAN, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0));
        assert!(nan.is_degenerate());
    }

    #[test]
    fn test_containment_is_inclusive() {
        let b = unit();
        assert!(b.contains_point(&Point3f::origin()));
        assert!(b.contains_point(&Point3f::new(1.0, 1.0, 1.0)));
        assert!(!b.contains_point(&Point3f::new(1.0001, 0.5, 0.5)));

        let inner = BoundingBox::new(Point3f::new(0.2, 0.2, 0.2), Point3f::new(0.8, 0.8, 0.8));
        assert!(b.contains_box(&inner));
        assert!(inner.is_contained_in(&b));
        assert!(!inner.contains_box(&b));
    }

    #[test]
    fn test_slab_intersection_catches_crossing_slabs() {
        // A thin slab along x and a thin slab along y crossing in the middle:
        // no corner of either lies inside the other.
        let a = BoundingBox::new(Point3f::new(-2.0, -0.1, -0.1), Point3f::new(2.0, 0.1, 0.1));
        let b = BoundingBox::new(Point3f::new(-0.1, -2.0, -0.1), Point3f::new(0.1, 2.0, 0.1));

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects_by_corners(&b));
        assert!(!b.intersects_by_corners(&a));
    }

    #[test]
    fn test_disjoint_and_touching() {
        let a = unit();
        let touching = BoundingBox::new(Point3f::new(1.0, 0.0, 0.0), Point3f::new(2.0, 1.0, 1.0));
        let apart = BoundingBox::new(Point3f::new(1.5, 0.0, 0.0), Point3f::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&apart));
    }

    #[test]
    fn test_octants_partition_parent() {
        let b = BoundingBox::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let children = b.octants();

        let mut volume = 0.0;
        for child in &children {
            assert!(b.contains_box(child));
            let s = child.size();
            volume += s.x * s.y * s.z;
        }
        assert_relative_eq!(volume, 8.0);

        // front left top: lower x, upper y, upper z
        assert_eq!(children[0].min, Point3f::new(-1.0, 0.0, 0.0));
        assert_eq!(children[0].max, Point3f::new(0.0, 1.0, 1.0));
        // back right bottom: upper x, lower y, lower z
        assert_eq!(children[7].min, Point3f::new(0.0, -1.0, -1.0));
        assert_eq!(children[7].max, Point3f::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_octant_index_matches_child_box() {
        let b = BoundingBox::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
        let samples = [
            Point3f::new(-0.5, 0.5, 0.5),
            Point3f::new(0.5, -0.5, -0.5),
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, -1.0, 1.0),
            Point3f::new(-1.0, 1.0, -1.0),
        ];
        for p in &samples {
            let index = b.octant_index(p);
            assert!(b.octant(index).contains_point(p), "{:?} not in octant {}", p, index);
        }
    }

    #[test]
    fn test_corners_bit_order() {
        let corners = unit().corners();
        assert_eq!(corners[0], Point3f::new(0.0, 0.0, 0.0));
        assert_eq!(corners[1], Point3f::new(1.0, 0.0, 0.0));
        assert_eq!(corners[2], Point3f::new(0.0, 1.0, 0.0));
        assert_eq!(corners[4], Point3f::new(0.0, 0.0, 1.0));
        assert_eq!(corners[7], Point3f::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_clamp_and_expand() {
        let b = unit();
        assert_eq!(b.clamp_point(&Point3f::new(2.0, -1.0, 0.5)), Point3f::new(1.0, 0.0, 0.5));
        let grown = b.expanded(0.5);
        assert_eq!(grown.min, Point3f::new(-0.5, -0.5, -0.5));
        assert_eq!(grown.max, Point3f::new(1.5, 1.5, 1.5));
    }

    #[test]
    fn test_from_points() {
        let pts = vec![
            Point3f::new(0.0, 2.0, -1.0),
            Point3f::new(1.0, -3.0, 4.0),
        ];
        let b = BoundingBox::from_points(&pts).unwrap();
        assert_eq!(b.min, Point3f::new(0.0, -3.0, -1.0));
        assert_eq!(b.max, Point3f::new(1.0, 2.0, 4.0));
        assert!(BoundingBox::from_points(&Vec::<Point3f>::new()).is_none());
    }
}
