//! Core sketching types shared by every module.

use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Type-safe graph node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Type-safe graph segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u32);

/// Type-safe committed stroke identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrokeId(pub u32);

/// Surface patch identifier handed out by the surface manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatchId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// One raw input sample of an in-progress stroke, in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: Vec3,
    /// Brush normal (device forward axis)
    pub normal: Vec3,
    /// Brush tangent (device up axis)
    pub tangent: Vec3,
    /// Pressure 0.0-1.0
    pub pressure: f32,
    pub velocity: Vec3,
    /// Host clock time at which the sample was recorded, in seconds
    pub creation_time: f32,
}

impl Sample {
    /// Create a sample with zero normal, tangent and velocity.
    pub fn at(position: Vec3, creation_time: f32) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            tangent: Vec3::ZERO,
            pressure: 1.0,
            velocity: Vec3::ZERO,
            creation_time,
        }
    }
}

/// Coordinate frame in which a position is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Space {
    /// Local frame of the drawing canvas
    #[default]
    Canvas,
    /// Tracking/device frame
    World,
}

/// Transform from canvas space to world space.
///
/// The canvas is uniformly scaled, rotated and translated; all core
/// geometry lives in canvas space and input positions are converted on
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasTransform {
    pub scale: f32,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }
}

impl CanvasTransform {
    pub fn new(scale: f32, rotation: Quat, translation: Vec3) -> Self {
        Self {
            scale,
            rotation,
            translation,
        }
    }

    /// World position to canvas position.
    pub fn to_canvas_point(&self, world: Vec3) -> Vec3 {
        (self.rotation.inverse() * (world - self.translation)) / self.scale
    }

    /// World direction to canvas direction (scale is ignored).
    pub fn to_canvas_direction(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * world
    }

    /// Canvas position to world position.
    pub fn to_world_point(&self, canvas: Vec3) -> Vec3 {
        self.translation + self.rotation * (canvas * self.scale)
    }

    /// Rescale the canvas while keeping `zoom_center` (world space) fixed.
    pub fn zoom(&mut self, new_scale: f32, zoom_center: Vec3) {
        let relative = new_scale / self.scale;
        self.translation = zoom_center + (self.translation - zoom_center) * relative;
        self.scale = new_scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_round_trip() {
        let transform = CanvasTransform::new(
            2.0,
            Quat::from_rotation_y(0.7),
            Vec3::new(1.0, -2.0, 0.5),
        );
        let world = Vec3::new(0.3, 0.4, -1.2);
        let canvas = transform.to_canvas_point(world);
        assert!(transform.to_world_point(canvas).abs_diff_eq(world, 1e-5));
    }

    #[test]
    fn test_direction_ignores_scale_and_translation() {
        let transform = CanvasTransform::new(3.0, Quat::IDENTITY, Vec3::splat(5.0));
        assert_eq!(transform.to_canvas_direction(Vec3::X), Vec3::X);
    }

    #[test]
    fn test_zoom_keeps_center_fixed() {
        let mut transform = CanvasTransform::default();
        let center = Vec3::new(1.0, 0.0, 0.0);
        let canvas_at_center = transform.to_canvas_point(center);
        transform.zoom(2.0, center);
        assert!(transform.to_world_point(canvas_at_center).abs_diff_eq(center, 1e-6));
        assert_eq!(transform.scale, 2.0);
    }
}
