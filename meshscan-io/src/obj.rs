//! Wavefront OBJ output for reconstructed meshes

use crate::MeshWriter;
use meshscan_core::{Result, TriangleMesh};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub struct ObjWriter;

/// Write `mesh` as OBJ text.
///
/// Vertex normals become `vn` lines and faces reference them with the
/// `a//a` form. Indices are 1-based. A mesh without faces is written as a
/// bare vertex list.
pub fn write_obj<W: Write>(mesh: &TriangleMesh, mut writer: W) -> Result<()> {
    writeln!(writer, "# meshscan reconstruction")?;
    writeln!(writer, "# vertices: {}, faces: {}", mesh.vertex_count(), mesh.face_count())?;

    for v in &mesh.vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }

    let normals = mesh
        .normals
        .as_ref()
        .filter(|normals| normals.len() == mesh.vertex_count());
    if let Some(normals) = normals {
        for n in normals {
            writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }

    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i + 1);
        if normals.is_some() {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }

    writer.flush()?;
    Ok(())
}

impl MeshWriter for ObjWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        write_obj(mesh, BufWriter::new(file))?;
        debug!(path = %path.display(), vertices = mesh.vertex_count(), "wrote OBJ mesh");
        Ok(())
    }
}
