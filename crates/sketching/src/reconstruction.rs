//! Surface reconstruction from committed stroke samples.
//!
//! The reconstructor itself lives outside the core (typically a native
//! library behind FFI). This module gathers the oriented sample cloud into a
//! flat `#[repr(C)]` buffer it can consume, and checks what comes back.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A sample position and its normal, laid out for foreign consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct OrientedPoint {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl OrientedPoint {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
        }
    }
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }
}

/// Errors from preparing or validating a reconstruction
#[derive(Debug, Error, PartialEq)]
pub enum ReconstructionError {
    #[error("No points to reconstruct from")]
    EmptyInput,
    #[error("Got {positions} positions but {normals} normals")]
    LengthMismatch { positions: usize, normals: usize },
    #[error("Mesh has {vertices} vertices and {faces} faces, limits are {max_vertices} and {max_faces}")]
    CapacityExceeded {
        vertices: usize,
        faces: usize,
        max_vertices: usize,
        max_faces: usize,
    },
    #[error("Triangle {triangle} references vertex {index} of {vertex_count}")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
}

/// Turns an oriented point cloud into a mesh.
///
/// Implementations report degenerate input as an empty mesh.
pub trait SurfaceReconstructor {
    fn reconstruct(&mut self, points: &[OrientedPoint], max_vertices: usize, max_faces: usize) -> TriangleMesh;
}

/// Pair positions with normals into the reconstructor's input buffer.
pub fn gather_points(positions: &[Vec3], normals: &[Vec3]) -> Result<Vec<OrientedPoint>, ReconstructionError> {
    if positions.len() != normals.len() {
        return Err(ReconstructionError::LengthMismatch {
            positions: positions.len(),
            normals: normals.len(),
        });
    }
    if positions.is_empty() {
        return Err(ReconstructionError::EmptyInput);
    }
    Ok(positions
        .iter()
        .zip(normals)
        .map(|(p, n)| OrientedPoint::new(*p, *n))
        .collect())
}

/// Check a reconstructed mesh against the capacities it was requested with.
pub fn validate_mesh(mesh: &TriangleMesh, max_vertices: usize, max_faces: usize) -> Result<(), ReconstructionError> {
    if mesh.vertices.len() > max_vertices || mesh.triangles.len() > max_faces {
        return Err(ReconstructionError::CapacityExceeded {
            vertices: mesh.vertices.len(),
            faces: mesh.triangles.len(),
            max_vertices,
            max_faces,
        });
    }
    let vertex_count = mesh.vertices.len();
    for (triangle, indices) in mesh.triangles.iter().enumerate() {
        if let Some(&index) = indices.iter().find(|i| **i as usize >= vertex_count) {
            return Err(ReconstructionError::IndexOutOfRange {
                triangle,
                index,
                vertex_count,
            });
        }
    }
    Ok(())
}
