//! Reconstruct a mesh from a captured point file
//!
//! ```text
//! reconstruct --input capture.xyz --output surface.obj --triangulate
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use meshscan_core::{BoundingBox, Point3f};
use meshscan_reconstruction::{
    init_thread_pool, ReconstructionConfig, Reconstructor, SolverFallback, ThreadPoolConfig,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Fallback {
    /// Place the vertex at the cell center
    Center,
    /// Drop the cell
    Skip,
}

impl From<Fallback> for SolverFallback {
    fn from(fallback: Fallback) -> Self {
        match fallback {
            Fallback::Center => SolverFallback::CellCenter,
            Fallback::Skip => SolverFallback::Skip,
        }
    }
}

/// Surface reconstruction for depth-capture point clouds
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Delimited text file with `x y z nx ny nz` rows
    #[clap(short, long)]
    input: PathBuf,

    /// Name of a `.obj` file to write
    #[clap(short, long)]
    output: PathBuf,

    /// Crop box as `min_x,min_y,min_z,max_x,max_y,max_z`
    ///
    /// Defaults to the bounds of the input grown by the vicinity radius.
    #[clap(long, value_delimiter = ',', allow_hyphen_values = true)]
    crop: Option<Vec<f32>>,

    /// Kernel support radius
    #[clap(short = 'r', long)]
    vicinity_radius: Option<f32>,

    /// Number of smoothing passes
    #[clap(long)]
    iterations: Option<usize>,

    /// Smallest octree cell edge
    #[clap(long)]
    minimum_cell_size: Option<f32>,

    /// Use cell centers instead of solving for vertex positions
    #[clap(long)]
    no_adaptive: bool,

    /// What to do with cells whose solve fails
    #[clap(long, value_enum, default_value_t = Fallback::Center)]
    fallback: Fallback,

    /// Connect vertices into triangles
    #[clap(long)]
    triangulate: bool,

    /// Drop samples below this sensor confidence
    #[clap(long)]
    min_confidence: Option<f32>,

    /// Number of worker threads (0 = one per core)
    #[clap(short, long, default_value_t = 0)]
    threads: usize,

    /// Run every stage on the calling thread
    #[clap(long)]
    sequential: bool,
}

impl Args {
    fn config(&self) -> ReconstructionConfig {
        let mut config = ReconstructionConfig::default()
            .with_adaptive(!self.no_adaptive)
            .with_solver_fallback(self.fallback.into())
            .with_triangulate(self.triangulate)
            .with_min_confidence(self.min_confidence)
            .with_parallel(!self.sequential);
        if let Some(radius) = self.vicinity_radius {
            config = config.with_vicinity_radius(radius);
        }
        if let Some(iterations) = self.iterations {
            config = config.with_max_smoothing_iterations(iterations);
        }
        if let Some(size) = self.minimum_cell_size {
            config = config.with_minimum_cell_size(size);
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.config();
    config.validate()?;

    init_thread_pool(
        ThreadPoolConfig::default()
            .with_threads(args.threads)
            .with_enabled(!args.sequential),
    )?;

    let cloud = meshscan_io::read_scan_points(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(points = cloud.len(), input = %args.input.display(), "loaded capture");

    let crop = match &args.crop {
        Some(values) => match values.as_slice() {
            [x0, y0, z0, x1, y1, z1] => {
                BoundingBox::new(Point3f::new(*x0, *y0, *z0), Point3f::new(*x1, *y1, *z1))
            }
            _ => bail!("--crop takes exactly six values"),
        },
        None => match cloud.bounding_box() {
            Some(bounds) => bounds.expanded(config.vicinity_radius),
            None => bail!("{} contains no points", args.input.display()),
        },
    };

    let result = Reconstructor::new(config).reconstruct(&cloud, &crop)?;
    meshscan_io::write_mesh(&result.mesh, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!(
        vertices = result.mesh.vertex_count(),
        faces = result.mesh.face_count(),
        elapsed_secs = result.stats.elapsed_secs,
        output = %args.output.display(),
        "wrote mesh"
    );
    Ok(())
}
