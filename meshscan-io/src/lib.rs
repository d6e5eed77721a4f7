//! I/O for the reconstruction pipeline
//!
//! Capture samples come in as delimited text (see [`xyz`]); reconstructed
//! meshes go out as Wavefront OBJ (see [`obj`]).

pub mod xyz;
pub mod obj;

pub use obj::{write_obj, ObjWriter};
pub use xyz::{parse_scan_points, read_scan_points, ColumnType, Delimiter, XyzSchema};

use meshscan_core::{Error, Result, TriangleMesh};
use std::path::Path;

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

/// Write a mesh in the format named by the file extension
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("obj") => ObjWriter::write_mesh(mesh, path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}
