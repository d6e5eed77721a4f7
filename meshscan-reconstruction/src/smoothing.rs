//! Iterative point relaxation toward the MLS zero level set
//!
//! Each pass freezes the current octree, moves every distinct sample of each
//! leaf along its normal by the clamped field value at the leaf center and
//! refreshes its normal from the field, then inserts the result into a fresh
//! tree over the same volume.

use crate::implicit::ImplicitSurface;
use crate::octree::Octree;
use crate::parallel;
use meshscan_core::{Error, Result, ScanPoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the smoothing iterator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Kernel bandwidth and largest displacement allowed per pass
    pub vicinity_radius: f32,
    /// Number of passes; 0 leaves the input untouched
    pub iterations: usize,
    /// Evaluate the field for all leaves in parallel
    pub parallel: bool,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            vicinity_radius: 0.05,
            iterations: 3,
            parallel: true,
        }
    }
}

impl SmoothingConfig {
    pub fn with_vicinity_radius(mut self, radius: f32) -> Self {
        self.vicinity_radius = radius;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.vicinity_radius.is_finite() && self.vicinity_radius > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "vicinity radius must be positive, got {}",
                self.vicinity_radius
            )));
        }
        Ok(())
    }
}

/// What happened during [`Smoother::smooth`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothingReport {
    pub iterations: usize,
    /// Largest point displacement of each pass
    pub max_displacements: Vec<f32>,
    /// Points carried into the tree built by each pass
    pub point_counts: Vec<usize>,
}

impl SmoothingReport {
    /// Largest displacement over all passes, 0 when nothing ran
    pub fn max_displacement(&self) -> f32 {
        self.max_displacements.iter().copied().fold(0.0, f32::max)
    }
}

/// Runs the fixed-count smoothing loop
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    config: SmoothingConfig,
}

impl Smoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// One relaxation pass, returning the rebuilt tree
    pub fn smooth_once(&self, tree: &Octree<ScanPoint>) -> Result<Octree<ScanPoint>> {
        self.config.validate()?;
        self.step(tree).map(|(next, _)| next)
    }

    /// Run all configured passes, consuming the input tree
    pub fn smooth(&self, tree: Octree<ScanPoint>) -> Result<(Octree<ScanPoint>, SmoothingReport)> {
        self.config.validate()?;

        let mut current = tree;
        let mut report = SmoothingReport::default();

        for iteration in 0..self.config.iterations {
            let (next, max_displacement) = self.step(&current)?;
            debug!(
                "smoothing pass {}/{}: {} points, max displacement {:.6}",
                iteration + 1,
                self.config.iterations,
                next.len(),
                max_displacement
            );

            report.iterations += 1;
            report.max_displacements.push(max_displacement);
            report.point_counts.push(next.len());
            current = next;
        }

        Ok((current, report))
    }

    /// Move every sample of the frozen tree, returning `(before, after)` pairs.
    ///
    /// Each distinct position in a leaf is carried forward once, so merged
    /// floor-sized buckets keep all their samples and exact duplicates
    /// collapse.
    fn relax(&self, tree: &Octree<ScanPoint>) -> Vec<(ScanPoint, ScanPoint)> {
        let radius = self.config.vicinity_radius;
        let bounds = *tree.bounds();
        let surface = ImplicitSurface::new(tree, radius);

        let samples: Vec<_> = tree
            .leaves()
            .flat_map(|leaf| {
                let center = leaf.bounds.center();
                leaf.distinct().into_iter().map(move |e| (center, e.value))
            })
            .collect();

        parallel::parallel_map_if(self.config.parallel, &samples, |(center, point)| {
            let offset = surface.scalar_field(center).clamp(-radius, radius);
            // projecting onto the box never increases the displacement
            let target = bounds.clamp_point(&(point.position - point.normal * offset));
            let normal = surface.normal_field(&target, point.normal);
            (*point, point.moved_to(target, normal))
        })
    }

    fn step(&self, tree: &Octree<ScanPoint>) -> Result<(Octree<ScanPoint>, f32)> {
        let mut next = Octree::new(*tree.bounds(), tree.minimum_cell_size())?;
        let mut max_displacement = 0.0f32;

        for (before, after) in self.relax(tree) {
            max_displacement = max_displacement.max((after.position - before.position).norm());
            next.insert(after, after.position)?;
        }

        Ok((next, max_displacement))
    }
}
