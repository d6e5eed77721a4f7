//! Dual contouring over the leaves of a smoothed octree
//!
//! Every leaf is treated as a cell. The implicit field is sampled at its 8
//! corners; each of the 12 edges whose supported endpoints differ in sign
//! yields a crossing point (linear interpolation) with the field normal at
//! that point. Cells with at least two crossings emit one vertex, either the
//! minimizer of the crossings' quadric error function or the cell center.
//!
//! With `triangulate` enabled, every sign-changed edge shared by three or more
//! active cells of equal size is closed by a fan through those cells'
//! vertices, oriented so faces point from the negative to the positive side.

use crate::implicit::ImplicitSurface;
use crate::parallel;
use crate::qef::Qef;
use meshscan_core::{BoundingBox, Error, Point3f, Result, TriangleMesh, Vector3f};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The 12 edges of a cell as corner index pairs, see [`BoundingBox::corners`].
///
/// The first corner of each pair is always the lower end along the edge axis.
pub const CELL_EDGES: [(usize, usize); 12] = [
    // x
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    // y
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    // z
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Cells with fewer sign-changed edges do not contribute a vertex
pub const MIN_CROSSINGS: usize = 2;

/// What to do with a cell whose QEF solve failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverFallback {
    /// Emit the cell center instead
    #[default]
    CellCenter,
    /// Drop the cell
    Skip,
}

/// Configuration for vertex extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualContouringConfig {
    /// Place vertices with the QEF solve; otherwise use cell centers
    pub adaptive: bool,
    pub fallback: SolverFallback,
    /// Connect vertices into triangles
    pub triangulate: bool,
    /// Process cells in parallel
    pub parallel: bool,
}

impl Default for DualContouringConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            fallback: SolverFallback::CellCenter,
            triangulate: false,
            parallel: true,
        }
    }
}

impl DualContouringConfig {
    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_fallback(mut self, fallback: SolverFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_triangulate(mut self, triangulate: bool) -> Self {
        self.triangulate = triangulate;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A zero crossing of the field on one cell edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCrossing {
    /// Corner indices of the edge, lower end first
    pub edge: (usize, usize),
    pub position: Point3f,
    /// Unit normal at the crossing
    pub normal: Vector3f,
}

/// Field samples and crossings of a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellCrossings {
    pub bounds: BoundingBox,
    /// Field value per corner, `None` where no sample lies within the radius
    pub corner_values: [Option<f32>; 8],
    pub crossings: Vec<EdgeCrossing>,
}

impl CellCrossings {
    /// Number of edges whose endpoints differ in sign
    pub fn sign_changes(&self) -> usize {
        self.crossings.len()
    }

    /// Whether the cell contributes a vertex
    pub fn is_active(&self) -> bool {
        self.crossings.len() >= MIN_CROSSINGS
    }

    /// Whether the field at corner `index` is positive
    pub fn is_positive(&self, index: usize) -> bool {
        self.corner_values[index].is_some_and(|v| v > 0.0)
    }
}

/// Counters collected during [`DualContouring::extract`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub cells_visited: usize,
    /// Cells with at least two sign-changed edges
    pub active_cells: usize,
    /// Active cells whose QEF solve failed
    pub solver_failures: usize,
    /// Active cells dropped after a solver failure
    pub skipped_cells: usize,
    pub vertices: usize,
    pub faces: usize,
}

/// Extracted mesh plus counters
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub mesh: TriangleMesh,
    pub stats: ExtractionStats,
}

/// Per-cell outcome, computed in parallel and folded sequentially
enum CellOutcome {
    Inactive,
    Vertex {
        position: Point3f,
        normal: Vector3f,
        crossings: CellCrossings,
        solver_error: Option<Error>,
    },
    Skipped(Error),
}

/// Dual contouring vertex extractor
#[derive(Debug, Clone, Default)]
pub struct DualContouring {
    config: DualContouringConfig,
}

impl DualContouring {
    pub fn new(config: DualContouringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DualContouringConfig {
        &self.config
    }

    /// Sample the field at the cell corners and locate edge crossings.
    ///
    /// Corners without support are ignored, so an edge only counts when both
    /// ends have a defined field value.
    pub fn analyze_cell(&self, surface: &ImplicitSurface<'_>, bounds: &BoundingBox) -> CellCrossings {
        let corners = bounds.corners();
        let corner_values = corners.map(|c| surface.try_scalar_field(&c));

        let crossings = CELL_EDGES
            .iter()
            .filter_map(|&(a, b)| {
                let (fa, fb) = (corner_values[a]?, corner_values[b]?);
                if (fa > 0.0) == (fb > 0.0) {
                    return None;
                }

                let t = -fa / (fb - fa);
                let position = corners[a] + (corners[b] - corners[a]) * t;
                // edge direction pointing to the positive end
                let toward_positive = if fb > fa {
                    corners[b] - corners[a]
                } else {
                    corners[a] - corners[b]
                };
                let normal = surface
                    .try_normal_field(&position)
                    .unwrap_or_else(|| toward_positive.normalize());

                Some(EdgeCrossing {
                    edge: (a, b),
                    position,
                    normal,
                })
            })
            .collect();

        CellCrossings {
            bounds: *bounds,
            corner_values,
            crossings,
        }
    }

    fn process_cell(&self, surface: &ImplicitSurface<'_>, bounds: &BoundingBox) -> CellOutcome {
        let crossings = self.analyze_cell(surface, bounds);
        if !crossings.is_active() {
            return CellOutcome::Inactive;
        }

        let (position, solver_error) = if self.config.adaptive {
            let mut qef = Qef::new();
            for c in &crossings.crossings {
                qef.add(c.position, c.normal);
            }
            match qef.solve() {
                Ok(solution) => (solution.position, None),
                Err(e) => match self.config.fallback {
                    SolverFallback::CellCenter => (bounds.center(), Some(e)),
                    SolverFallback::Skip => return CellOutcome::Skipped(e),
                },
            }
        } else {
            (bounds.center(), None)
        };

        let mean_normal = crossings
            .crossings
            .iter()
            .fold(Vector3f::zeros(), |acc, c| acc + c.normal)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3f::z);
        let normal = surface.normal_field(&position, mean_normal);

        CellOutcome::Vertex {
            position,
            normal,
            crossings,
            solver_error,
        }
    }

    /// Emit one vertex per active leaf of the surface's octree
    pub fn extract(&self, surface: &ImplicitSurface<'_>) -> Result<ExtractionOutput> {
        let radius = surface.radius();
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "kernel radius must be positive, got {}",
                radius
            )));
        }

        let cells: Vec<BoundingBox> = surface.tree().leaves().map(|leaf| *leaf.bounds).collect();
        let outcomes = parallel::parallel_map_if(self.config.parallel, &cells, |bounds| {
            self.process_cell(surface, bounds)
        });

        let mut stats = ExtractionStats {
            cells_visited: cells.len(),
            ..ExtractionStats::default()
        };
        let mut vertices = Vec::new();
        let mut normals = Vec::new();
        let mut active = Vec::new();

        for outcome in outcomes {
            match outcome {
                CellOutcome::Inactive => {}
                CellOutcome::Skipped(e) => {
                    stats.active_cells += 1;
                    stats.solver_failures += 1;
                    stats.skipped_cells += 1;
                    debug!("skipping cell: {}", e);
                }
                CellOutcome::Vertex {
                    position,
                    normal,
                    crossings,
                    solver_error,
                } => {
                    stats.active_cells += 1;
                    if let Some(e) = solver_error {
                        stats.solver_failures += 1;
                        debug!("using cell center: {}", e);
                    }
                    vertices.push(position);
                    normals.push(normal);
                    active.push(crossings);
                }
            }
        }

        if stats.solver_failures > 0 {
            warn!(
                "{} of {} active cells failed the QEF solve",
                stats.solver_failures, stats.active_cells
            );
        }

        let faces = if self.config.triangulate {
            triangulate(&active, &vertices, surface.tree().minimum_cell_size())
        } else {
            Vec::new()
        };

        stats.vertices = vertices.len();
        stats.faces = faces.len();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_normals(normals);

        Ok(ExtractionOutput { mesh, stats })
    }
}

/// Shared cell edge identified by its quantized endpoints
type EdgeKey = ([i64; 3], [i64; 3]);

struct EdgeFan {
    low: Point3f,
    high: Point3f,
    low_positive: bool,
    vertices: Vec<usize>,
}

fn quantize(p: &Point3f, quantum: f32) -> [i64; 3] {
    [
        (p.x / quantum).round() as i64,
        (p.y / quantum).round() as i64,
        (p.z / quantum).round() as i64,
    ]
}

/// Build triangle fans around edges shared by at least three active cells.
///
/// `active[i]` holds the crossings of the cell that produced `vertices[i]`.
fn triangulate(active: &[CellCrossings], vertices: &[Point3f], minimum_cell_size: f32) -> Vec<[usize; 3]> {
    // leaf corners are at least one minimum cell apart
    let quantum = minimum_cell_size / 4.0;
    let mut fans: BTreeMap<EdgeKey, EdgeFan> = BTreeMap::new();

    for (vertex, cell) in active.iter().enumerate() {
        let corners = cell.bounds.corners();
        for crossing in &cell.crossings {
            let (a, b) = crossing.edge;
            let key = (quantize(&corners[a], quantum), quantize(&corners[b], quantum));
            fans.entry(key)
                .or_insert_with(|| EdgeFan {
                    low: corners[a],
                    high: corners[b],
                    low_positive: cell.is_positive(a),
                    vertices: Vec::new(),
                })
                .vertices
                .push(vertex);
        }
    }

    let mut faces = Vec::new();
    for fan in fans.values() {
        if fan.vertices.len() < 3 {
            continue;
        }

        let ordered = sort_around_edge(fan, vertices);
        for i in 1..ordered.len() - 1 {
            if fan.low_positive {
                faces.push([ordered[0], ordered[i + 1], ordered[i]]);
            } else {
                faces.push([ordered[0], ordered[i], ordered[i + 1]]);
            }
        }
    }

    faces
}

/// Order fan vertices counter-clockwise around the edge axis (low to high)
fn sort_around_edge(fan: &EdgeFan, vertices: &[Point3f]) -> Vec<usize> {
    let axis = (fan.high - fan.low).normalize();
    let mid = nalgebra::center(&fan.low, &fan.high);
    let helper = if axis.x.abs() < 0.9 { Vector3f::x() } else { Vector3f::y() };
    let u = axis.cross(&helper).normalize();
    let v = axis.cross(&u);

    let mut keyed: Vec<(f32, usize)> = fan
        .vertices
        .iter()
        .map(|&i| {
            let w = vertices[i] - mid;
            (w.dot(&v).atan2(w.dot(&u)), i)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    keyed.into_iter().map(|(_, i)| i).collect()
}
