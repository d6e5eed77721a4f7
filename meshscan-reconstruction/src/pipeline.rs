//! End-to-end reconstruction: crop, index, smooth, extract
//!
//! The pipeline is a one-shot batch operation. Configuration and input are
//! checked before any index is built; afterwards only per-cell solver
//! failures can occur, and those are absorbed by the extractor.

use crate::dual_contouring::{DualContouring, DualContouringConfig, ExtractionStats, SolverFallback};
use crate::implicit::ImplicitSurface;
use crate::octree::Octree;
use crate::smoothing::{Smoother, SmoothingConfig, SmoothingReport};
use meshscan_core::{BoundingBox, Error, Result, ScanCloud, ScanPoint, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Configuration for the reconstruction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Kernel bandwidth, also the largest displacement per smoothing pass
    pub vicinity_radius: f32,
    pub max_smoothing_iterations: usize,
    /// Octree subdivision floor
    pub minimum_cell_size: f32,
    /// QEF vertex placement instead of cell centers
    pub adaptive: bool,
    pub solver_fallback: SolverFallback,
    /// Connect the extracted vertices into triangles
    pub triangulate: bool,
    /// Drop points whose sensor confidence is below this value
    pub min_confidence: Option<f32>,
    /// Run field evaluation and cell solves on the thread pool
    pub parallel: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            vicinity_radius: 0.05,
            max_smoothing_iterations: 3,
            minimum_cell_size: 0.0001,
            adaptive: true,
            solver_fallback: SolverFallback::CellCenter,
            triangulate: false,
            min_confidence: None,
            parallel: true,
        }
    }
}

impl ReconstructionConfig {
    pub fn with_vicinity_radius(mut self, radius: f32) -> Self {
        self.vicinity_radius = radius;
        self
    }

    pub fn with_max_smoothing_iterations(mut self, iterations: usize) -> Self {
        self.max_smoothing_iterations = iterations;
        self
    }

    pub fn with_minimum_cell_size(mut self, size: f32) -> Self {
        self.minimum_cell_size = size;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_solver_fallback(mut self, fallback: SolverFallback) -> Self {
        self.solver_fallback = fallback;
        self
    }

    pub fn with_triangulate(mut self, triangulate: bool) -> Self {
        self.triangulate = triangulate;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: Option<f32>) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject parameters the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.vicinity_radius.is_finite() && self.vicinity_radius > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "vicinity radius must be positive, got {}",
                self.vicinity_radius
            )));
        }
        if !(self.minimum_cell_size.is_finite() && self.minimum_cell_size > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "minimum cell size must be positive, got {}",
                self.minimum_cell_size
            )));
        }
        if let Some(threshold) = self.min_confidence {
            if !threshold.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "confidence threshold must be finite, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }

    pub fn smoothing(&self) -> SmoothingConfig {
        SmoothingConfig {
            vicinity_radius: self.vicinity_radius,
            iterations: self.max_smoothing_iterations,
            parallel: self.parallel,
        }
    }

    pub fn contouring(&self) -> DualContouringConfig {
        DualContouringConfig {
            adaptive: self.adaptive,
            fallback: self.solver_fallback,
            triangulate: self.triangulate,
            parallel: self.parallel,
        }
    }
}

/// Counters and timings of one reconstruction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionStats {
    pub input_points: usize,
    /// Points outside the crop volume
    pub cropped_points: usize,
    /// Points below the confidence threshold
    pub low_confidence_points: usize,
    /// Points inserted into the initial octree
    pub indexed_points: usize,
    pub tree_depth: usize,
    pub leaf_count: usize,
    pub smoothing: SmoothingReport,
    pub extraction: ExtractionStats,
    pub elapsed_secs: f32,
}

/// The reconstructed mesh with its statistics
#[derive(Debug, Clone)]
pub struct ReconstructionResult {
    pub mesh: TriangleMesh,
    pub stats: ReconstructionStats,
}

/// Runs the full reconstruction pipeline
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    config: ReconstructionConfig,
}

impl Reconstructor {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstruct the surface sampled by `cloud` inside `crop`
    pub fn reconstruct(&self, cloud: &ScanCloud, crop: &BoundingBox) -> Result<ReconstructionResult> {
        let start = Instant::now();
        self.config.validate()?;
        crop.validate()?;

        let mut stats = ReconstructionStats {
            input_points: cloud.len(),
            ..ReconstructionStats::default()
        };

        let points = self.ingest(cloud, crop, &mut stats)?;
        if points.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no usable points inside the crop volume ({} input, {} cropped, {} below confidence)",
                stats.input_points, stats.cropped_points, stats.low_confidence_points
            )));
        }

        let mut tree = Octree::new(*crop, self.config.minimum_cell_size)?;
        for point in points {
            tree.insert(point, point.position)?;
        }
        stats.indexed_points = tree.len();
        debug!(
            "indexed {} points, depth {}, {} leaves",
            tree.len(),
            tree.depth(),
            tree.leaf_count()
        );

        let (tree, report) = Smoother::new(self.config.smoothing()).smooth(tree)?;
        stats.smoothing = report;
        stats.tree_depth = tree.depth();
        stats.leaf_count = tree.leaf_count();

        let surface = ImplicitSurface::new(&tree, self.config.vicinity_radius);
        let output = DualContouring::new(self.config.contouring()).extract(&surface)?;
        stats.extraction = output.stats;
        stats.elapsed_secs = start.elapsed().as_secs_f32();

        info!(
            "reconstructed {} vertices and {} faces from {} points in {:.3}s",
            output.mesh.vertex_count(),
            output.mesh.face_count(),
            stats.indexed_points,
            stats.elapsed_secs
        );

        Ok(ReconstructionResult {
            mesh: output.mesh,
            stats,
        })
    }

    /// Reject non-finite samples, then crop, filter by confidence and
    /// normalize normals
    fn ingest(
        &self,
        cloud: &ScanCloud,
        crop: &BoundingBox,
        stats: &mut ReconstructionStats,
    ) -> Result<Vec<ScanPoint>> {
        for (index, point) in cloud.iter().enumerate() {
            if !point.position.iter().all(|c| c.is_finite()) {
                return Err(Error::InvalidInput(format!(
                    "point {} has a non-finite position {:?}",
                    index, point.position
                )));
            }
            if !point.normal.iter().all(|c| c.is_finite()) {
                return Err(Error::InvalidInput(format!(
                    "point {} has a non-finite normal {:?}",
                    index, point.normal
                )));
            }
        }

        let inside = cloud.crop(crop);
        stats.cropped_points = cloud.len() - inside.len();

        let mut points = Vec::with_capacity(inside.len());
        for point in inside {
            if let (Some(threshold), Some(confidence)) = (self.config.min_confidence, point.confidence) {
                if confidence < threshold {
                    stats.low_confidence_points += 1;
                    continue;
                }
            }
            let normal = point.normal.try_normalize(f32::EPSILON).ok_or_else(|| {
                Error::NumericDegeneracy(format!(
                    "point at {:?} has a zero-length normal",
                    point.position
                ))
            })?;
            points.push(point.moved_to(point.position, normal));
        }

        debug!(
            "kept {} of {} points ({} cropped, {} below confidence)",
            points.len(),
            cloud.len(),
            stats.cropped_points,
            stats.low_confidence_points
        );
        Ok(points)
    }
}

/// Reconstruct with the reference configuration
pub fn reconstruct(cloud: &ScanCloud, crop: &BoundingBox) -> Result<TriangleMesh> {
    Reconstructor::default()
        .reconstruct(cloud, crop)
        .map(|result| result.mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshscan_core::{Point3f, Vector3f};

    fn plane_cloud() -> ScanCloud {
        let mut cloud = ScanCloud::new();
        for i in 0..30 {
            for j in 0..30 {
                let p = Point3f::new(i as f32 * 0.02 - 0.3, j as f32 * 0.02 - 0.3, 0.0);
                cloud.push(ScanPoint::new(p, Vector3f::new(0.0, 0.0, 2.0)).with_confidence((i % 3) as f32));
            }
        }
        cloud
    }

    fn crop() -> BoundingBox {
        BoundingBox::new(Point3f::new(-0.5, -0.5, -0.5), Point3f::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_default_config_matches_reference() {
        let config = ReconstructionConfig::default();
        assert_eq!(config.vicinity_radius, 0.05);
        assert_eq!(config.max_smoothing_iterations, 3);
        assert_eq!(config.minimum_cell_size, 0.0001);
        assert!(config.adaptive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let bad = [
            ReconstructionConfig::default().with_vicinity_radius(-1.0),
            ReconstructionConfig::default().with_minimum_cell_size(0.0),
            ReconstructionConfig::default().with_min_confidence(Some(f32::NAN)),
        ];
        for config in bad {
            let result = Reconstructor::new(config).reconstruct(&plane_cloud(), &crop());
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_empty_and_degenerate_input() {
        let empty = ScanCloud::new();
        assert!(matches!(reconstruct(&empty, &crop()), Err(Error::InvalidInput(_))));

        let flat = BoundingBox::new(Point3f::origin(), Point3f::new(1.0, 1.0, 0.0));
        assert!(matches!(reconstruct(&plane_cloud(), &flat), Err(Error::InvalidInput(_))));

        let elsewhere = BoundingBox::new(Point3f::new(5.0, 5.0, 5.0), Point3f::new(6.0, 6.0, 6.0));
        assert!(matches!(reconstruct(&plane_cloud(), &elsewhere), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_zero_normal_is_rejected() {
        let mut cloud = plane_cloud();
        cloud.push(ScanPoint::new(Point3f::new(0.1, 0.1, 0.1), Vector3f::zeros()));
        assert!(matches!(reconstruct(&cloud, &crop()), Err(Error::NumericDegeneracy(_))));
    }

    #[test]
    fn test_non_finite_points_are_rejected_not_cropped() {
        let mut cloud = plane_cloud();
        cloud.push(ScanPoint::new(Point3f::new(f32::NAN, 0.0, 0.0), Vector3f::z()));
        match reconstruct(&cloud, &crop()) {
            Err(Error::InvalidInput(message)) => assert!(message.contains("position"), "{}", message),
            other => panic!("expected invalid input, got {:?}", other.map(|m| m.vertex_count())),
        }

        // outside the crop box, but still malformed
        let mut cloud = plane_cloud();
        cloud.push(ScanPoint::new(Point3f::new(3.0, 0.0, 0.0), Vector3f::new(0.0, f32::INFINITY, 0.0)));
        match reconstruct(&cloud, &crop()) {
            Err(Error::InvalidInput(message)) => assert!(message.contains("normal"), "{}", message),
            other => panic!("expected invalid input, got {:?}", other.map(|m| m.vertex_count())),
        }
    }

    #[test]
    fn test_crop_and_confidence_filter() {
        let mut cloud = plane_cloud();
        cloud.push(ScanPoint::new(Point3f::new(2.0, 0.0, 0.0), Vector3f::z()));

        let config = ReconstructionConfig::default()
            .with_max_smoothing_iterations(0)
            .with_min_confidence(Some(2.0));
        let result = Reconstructor::new(config).reconstruct(&cloud, &crop()).unwrap();

        assert_eq!(result.stats.input_points, 901);
        assert_eq!(result.stats.cropped_points, 1);
        assert_eq!(result.stats.low_confidence_points, 600);
        assert_eq!(result.stats.indexed_points, 300);
    }

    #[test]
    fn test_plane_vertices_stay_near_plane() {
        let config = ReconstructionConfig::default().with_vicinity_radius(0.06);
        let result = Reconstructor::new(config).reconstruct(&plane_cloud(), &crop()).unwrap();

        assert!(result.mesh.vertex_count() > 0);
        assert_eq!(result.stats.smoothing.iterations, 3);
        assert_eq!(result.stats.extraction.vertices, result.mesh.vertex_count());
        for v in &result.mesh.vertices {
            assert!(v.z.abs() < 0.06, "vertex {:?} too far from the plane", v);
        }
    }
}
