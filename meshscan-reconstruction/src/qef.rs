//! Quadric error function for placing dual contouring vertices
//!
//! Given crossing points `c_i` with normals `n_i`, finds `x` minimizing
//! `Σ (n_i · (x - c_i))²`. The system `A x = b` (rows `n_i`, `b_i = n_i · c_i`)
//! is solved by SVD about the mass point of the crossings. Singular values
//! below a fraction of the largest are truncated, so flat and edge-like
//! patches resolve to the minimizer closest to the mass point instead of
//! shooting off along the unconstrained directions.

use meshscan_core::{Error, Point3f, Result, Vector3f};
use nalgebra::{DMatrix, DVector, SVD};

/// Singular values below this fraction of the largest are treated as zero
const RELATIVE_TRUNCATION: f32 = 0.1;

const SVD_MAX_ITERATIONS: usize = 100;

/// Result of a successful QEF solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QefSolution {
    pub position: Point3f,
    /// Sum of squared plane distances at `position`
    pub residual: f32,
    /// Number of singular values kept, 1 for a plane, 3 for a corner
    pub rank: usize,
}

/// Accumulated tangent planes of one cell
#[derive(Debug, Clone, Default)]
pub struct Qef {
    positions: Vec<Point3f>,
    normals: Vec<Vector3f>,
}

impl Qef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel slices of plane points and normals
    pub fn from_planes(positions: &[Point3f], normals: &[Vector3f]) -> Self {
        let mut qef = Self::new();
        for (p, n) in positions.iter().zip(normals) {
            qef.add(*p, *n);
        }
        qef
    }

    /// Add the plane through `position` with normal `normal`
    pub fn add(&mut self, position: Point3f, normal: Vector3f) {
        self.positions.push(position);
        self.normals.push(normal);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Average of the plane points
    pub fn mass_point(&self) -> Option<Point3f> {
        if self.is_empty() {
            return None;
        }
        let sum = self
            .positions
            .iter()
            .fold(Vector3f::zeros(), |acc, p| acc + p.coords);
        Some(Point3f::from(sum / self.len() as f32))
    }

    /// Sum of squared distances from `x` to every plane
    pub fn residual(&self, x: &Point3f) -> f32 {
        self.positions
            .iter()
            .zip(&self.normals)
            .map(|(c, n)| n.dot(&(x - c)).powi(2))
            .sum()
    }

    /// Least-squares minimizer of the accumulated planes
    pub fn solve(&self) -> Result<QefSolution> {
        let mass = self
            .mass_point()
            .ok_or_else(|| Error::SolverFailure("no planes to solve".to_string()))?;

        let rows = self.len();
        let a = DMatrix::from_fn(rows, 3, |i, j| self.normals[i][j]);
        let b = DVector::from_fn(rows, |i, _| self.normals[i].dot(&(self.positions[i] - mass)));

        let svd = SVD::try_new(a, true, true, f32::EPSILON, SVD_MAX_ITERATIONS)
            .ok_or_else(|| Error::SolverFailure("SVD did not converge".to_string()))?;

        let largest = svd.singular_values.max();
        if !(largest.is_finite() && largest > 0.0) {
            return Err(Error::SolverFailure(format!(
                "degenerate plane normals (largest singular value {})",
                largest
            )));
        }

        let tolerance = largest * RELATIVE_TRUNCATION;
        let rank = svd.singular_values.iter().filter(|s| **s > tolerance).count();
        let offset = svd
            .solve(&b, tolerance)
            .map_err(|e| Error::SolverFailure(e.to_string()))?;

        let position = mass + Vector3f::new(offset[0], offset[1], offset[2]);
        if !position.iter().all(|c| c.is_finite()) {
            return Err(Error::SolverFailure("non-finite solution".to_string()));
        }

        Ok(QefSolution {
            position,
            residual: self.residual(&position),
            rank,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_planar_patch_lands_on_plane() {
        let n = Vector3f::new(1.0, 2.0, 2.0).normalize();
        let d = 0.7;
        // four points with n·c = d
        let tangent_a = Vector3f::new(2.0, -1.0, 0.0).normalize();
        let tangent_b = n.cross(&tangent_a);
        let base = Point3f::from(n * d);
        let positions = [
            base + tangent_a * 0.1,
            base - tangent_a * 0.2,
            base + tangent_b * 0.15,
            base - tangent_b * 0.05 + tangent_a * 0.03,
        ];
        let normals = [n; 4];

        let solution = Qef::from_planes(&positions, &normals).solve().unwrap();
        assert_eq!(solution.rank, 1);
        assert_relative_eq!(n.dot(&solution.position.coords), d, epsilon = 1e-5);
        assert!(solution.residual < 1e-8);
    }

    #[test]
    fn test_three_planes_meet_at_corner() {
        let mut qef = Qef::new();
        qef.add(Point3f::new(1.0, 0.3, 0.2), Vector3f::x());
        qef.add(Point3f::new(0.1, 2.0, 0.4), Vector3f::y());
        qef.add(Point3f::new(0.5, 0.6, 3.0), Vector3f::z());

        let solution = qef.solve().unwrap();
        assert_eq!(solution.rank, 3);
        assert_relative_eq!(solution.position, Point3f::new(1.0, 2.0, 3.0), epsilon = 1e-5);
        assert!(solution.residual < 1e-8);
    }

    #[test]
    fn test_edge_stays_near_mass_point() {
        let mut qef = Qef::new();
        qef.add(Point3f::new(0.0, 0.0, 0.0), Vector3f::x());
        qef.add(Point3f::new(0.0, 0.0, 1.0), Vector3f::x());
        qef.add(Point3f::new(0.5, 1.0, 0.5), Vector3f::y());

        let solution = qef.solve().unwrap();
        assert_eq!(solution.rank, 2);
        assert_relative_eq!(solution.position.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(solution.position.y, 1.0, epsilon = 1e-5);
        // unconstrained along z, so it keeps the mass point's z
        assert_relative_eq!(solution.position.z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_residual() {
        let qef = Qef::from_planes(&[Point3f::origin()], &[Vector3f::z()]);
        assert_relative_eq!(qef.residual(&Point3f::new(3.0, 4.0, 0.5)), 0.25);
    }

    #[test]
    fn test_degenerate_inputs_fail() {
        assert!(matches!(Qef::new().solve(), Err(Error::SolverFailure(_))));

        let zero_normals = Qef::from_planes(
            &[Point3f::origin(), Point3f::new(1.0, 0.0, 0.0)],
            &[Vector3f::zeros(), Vector3f::zeros()],
        );
        assert!(matches!(zero_normals.solve(), Err(Error::SolverFailure(_))));
    }
}
