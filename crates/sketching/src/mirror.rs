//! Mirror plane and stroke symmetry bookkeeping.

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::types::StrokeId;

/// A symmetry plane in canvas space.
pub trait MirrorPlane {
    /// Closest point on the plane.
    fn project(&self, position: Vec3) -> Vec3;

    /// Unit plane normal.
    fn normal(&self) -> Vec3;

    /// Reflection of a point through the plane.
    fn mirror(&self, position: Vec3) -> Vec3;

    /// Reflection of a direction.
    fn mirror_direction(&self, direction: Vec3) -> Vec3 {
        let n = self.normal();
        direction - n * 2.0 * direction.dot(n)
    }

    /// Signed distance from the plane along its normal.
    fn signed_distance(&self, position: Vec3) -> f32 {
        (position - self.project(position)).dot(self.normal())
    }

    /// The stroke mirrored with `stroke`, which may be itself.
    fn try_get_symmetric(&self, stroke: StrokeId) -> Option<StrokeId>;

    /// Record that `a` and `b` mirror each other.
    fn register_pair(&mut self, a: StrokeId, b: StrokeId);

    /// Forget `stroke` and its counterpart's link to it.
    fn unlink(&mut self, stroke: StrokeId);

    /// Forget every pair.
    fn clear_pairs(&mut self);
}

/// Plane through `point` with unit `normal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymmetryPlane {
    point: Vec3,
    normal: Vec3,
    #[serde(skip)]
    pairs: HashMap<StrokeId, StrokeId>,
}

impl Default for SymmetryPlane {
    /// The canvas YZ plane.
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::X)
    }
}

impl SymmetryPlane {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalize_or(Vec3::X),
            pairs: HashMap::new(),
        }
    }

    pub fn point(&self) -> Vec3 {
        self.point
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

impl MirrorPlane for SymmetryPlane {
    fn project(&self, position: Vec3) -> Vec3 {
        position - self.normal * (position - self.point).dot(self.normal)
    }

    fn normal(&self) -> Vec3 {
        self.normal
    }

    fn mirror(&self, position: Vec3) -> Vec3 {
        position - self.normal * 2.0 * (position - self.point).dot(self.normal)
    }

    fn try_get_symmetric(&self, stroke: StrokeId) -> Option<StrokeId> {
        self.pairs.get(&stroke).copied()
    }

    fn register_pair(&mut self, a: StrokeId, b: StrokeId) {
        self.pairs.insert(a, b);
        self.pairs.insert(b, a);
    }

    fn unlink(&mut self, stroke: StrokeId) {
        if let Some(other) = self.pairs.remove(&stroke) {
            if self.pairs.get(&other) == Some(&stroke) {
                self.pairs.remove(&other);
            }
        }
    }

    fn clear_pairs(&mut self) {
        self.pairs.clear();
    }
}
