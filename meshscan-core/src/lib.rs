//! Core data structures for meshscan
//!
//! This crate provides the fundamental types shared by the reconstruction
//! pipeline and its collaborators: capture samples, point clouds, axis-aligned
//! bounds, triangle meshes and the common error type.

pub mod point;
pub mod point_cloud;
pub mod bounds;
pub mod mesh;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use bounds::*;
pub use mesh::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
