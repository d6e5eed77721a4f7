//! # meshscan reconstruction
//!
//! Surface reconstruction for dense, noisy depth-capture point clouds.
//!
//! The pipeline indexes the cropped samples in an adaptive octree, relaxes
//! them toward the zero level set of a moving least squares implicit surface
//! over a fixed number of passes, then extracts one vertex per surface-crossing
//! leaf with dual contouring.
//!
//! ```no_run
//! use meshscan_core::{BoundingBox, Point3f, ScanCloud};
//! use meshscan_reconstruction::{ReconstructionConfig, Reconstructor};
//!
//! # fn main() -> meshscan_core::Result<()> {
//! let cloud = ScanCloud::new();
//! let crop = BoundingBox::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0));
//! let config = ReconstructionConfig::default().with_triangulate(true);
//! let result = Reconstructor::new(config).reconstruct(&cloud, &crop)?;
//! println!("{} vertices", result.mesh.vertex_count());
//! # Ok(())
//! # }
//! ```

pub mod octree;
pub mod implicit;
pub mod smoothing;
pub mod qef;
pub mod dual_contouring;
pub mod parallel;
pub mod pipeline;

// Re-export commonly used items
pub use octree::{Element, LeafView, Leaves, Octree, OctreeNode};
pub use implicit::{wendland_weight, ImplicitSurface, Neighborhood};
pub use smoothing::{Smoother, SmoothingConfig, SmoothingReport};
pub use qef::{Qef, QefSolution};
pub use dual_contouring::{
    CellCrossings, DualContouring, DualContouringConfig, EdgeCrossing, ExtractionOutput,
    ExtractionStats, SolverFallback, CELL_EDGES,
};
pub use parallel::{init_thread_pool, ThreadPoolConfig};
pub use pipeline::{
    reconstruct, ReconstructionConfig, ReconstructionResult, ReconstructionStats, Reconstructor,
};

pub use meshscan_core::{Error, Result};
