//! Surface patch management.
//!
//! The sketching core only needs to hand cycles to something that builds
//! patches and to project the pen onto a selected patch. [`PlanarPatches`]
//! is an in-memory implementation that models each patch as the best-fit
//! plane of its cycle.

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::debug;

use crate::graph::polygon::{centroid, contains_point, newell_normal, project};
use crate::graph::Cycle;
use crate::types::{CanvasTransform, PatchId, Space};

/// Builds and owns the surface patches bounded by cycles.
pub trait SurfaceManager {
    /// Build a patch for a new cycle.
    fn add_patch(&mut self, cycle: &Cycle) -> PatchId;

    /// Remove a patch; `false` if it did not exist.
    fn delete_patch(&mut self, patch: PatchId) -> bool;

    /// Project `position` (expressed in `space`) onto a patch.
    ///
    /// Returns the projected point in the same space, or `None` when the
    /// point does not project inside the patch.
    fn project_on_patch(
        &self,
        patch: PatchId,
        position: Vec3,
        space: Space,
        transform: &CanvasTransform,
    ) -> Option<Vec3>;

    /// The user started drawing details on a patch.
    fn on_detail_draw_start(&mut self, patch: PatchId);

    /// The user stopped drawing details on a patch.
    fn on_detail_draw_stop(&mut self, patch: PatchId);
}

/// A planar patch bounded by a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarPatch {
    pub origin: Vec3,
    /// Unit normal of the best-fit plane
    pub normal: Vec3,
    pub boundary: Vec<Vec3>,
    pub detail_drawing: bool,
}

impl PlanarPatch {
    fn from_cycle(cycle: &Cycle) -> Self {
        Self {
            origin: centroid(&cycle.positions),
            normal: newell_normal(&cycle.positions).normalize_or(Vec3::Z),
            boundary: cycle.positions.clone(),
            detail_drawing: false,
        }
    }

    /// Canvas-space projection onto the plane, if inside the boundary.
    pub fn project(&self, position: Vec3) -> Option<Vec3> {
        let projected = position - self.normal * (position - self.origin).dot(self.normal);
        let mut points = self.boundary.clone();
        points.push(projected);
        let flat = project(&points, self.normal);
        let (polygon, point) = flat.split_at(self.boundary.len());
        contains_point(polygon, point[0]).then_some(projected)
    }
}

/// In-memory planar surface manager.
#[derive(Debug, Clone, Default)]
pub struct PlanarPatches {
    patches: BTreeMap<PatchId, PlanarPatch>,
    next_id: u32,
}

impl PlanarPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patch(&self, id: PatchId) -> Option<&PlanarPatch> {
        self.patches.get(&id)
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn ids(&self) -> Vec<PatchId> {
        self.patches.keys().copied().collect()
    }
}

impl SurfaceManager for PlanarPatches {
    fn add_patch(&mut self, cycle: &Cycle) -> PatchId {
        let id = PatchId(self.next_id);
        self.next_id += 1;
        self.patches.insert(id, PlanarPatch::from_cycle(cycle));
        debug!("PlanarPatches::add_patch: {} with {} corners", id, cycle.nodes.len());
        id
    }

    fn delete_patch(&mut self, patch: PatchId) -> bool {
        self.patches.remove(&patch).is_some()
    }

    fn project_on_patch(
        &self,
        patch: PatchId,
        position: Vec3,
        space: Space,
        transform: &CanvasTransform,
    ) -> Option<Vec3> {
        let patch = self.patches.get(&patch)?;
        match space {
            Space::Canvas => patch.project(position),
            Space::World => patch
                .project(transform.to_canvas_point(position))
                .map(|p| transform.to_world_point(p)),
        }
    }

    fn on_detail_draw_start(&mut self, patch: PatchId) {
        if let Some(p) = self.patches.get_mut(&patch) {
            p.detail_drawing = true;
        }
    }

    fn on_detail_draw_stop(&mut self, patch: PatchId) {
        if let Some(p) = self.patches.get_mut(&patch) {
            p.detail_drawing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, SegmentId};
    use glam::Quat;

    fn unit_square_cycle() -> Cycle {
        Cycle {
            nodes: (0..4).map(NodeId).collect(),
            segments: (0..4).map(SegmentId).collect(),
            positions: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::Y,
            ],
            length: 4.0,
            patch: None,
        }
    }

    #[test]
    fn test_add_and_delete_patch() {
        let mut patches = PlanarPatches::new();
        let id = patches.add_patch(&unit_square_cycle());
        assert_eq!(patches.len(), 1);
        assert!(patches.delete_patch(id));
        assert!(!patches.delete_patch(id));
    }

    #[test]
    fn test_project_inside_and_outside() {
        let mut patches = PlanarPatches::new();
        let id = patches.add_patch(&unit_square_cycle());
        let transform = CanvasTransform::default();

        let p = patches
            .project_on_patch(id, Vec3::new(0.5, 0.5, 0.3), Space::Canvas, &transform)
            .unwrap();
        assert!(p.abs_diff_eq(Vec3::new(0.5, 0.5, 0.0), 1e-6));
        assert!(patches
            .project_on_patch(id, Vec3::new(1.5, 0.5, 0.0), Space::Canvas, &transform)
            .is_none());
        assert!(patches
            .project_on_patch(PatchId(42), Vec3::ZERO, Space::Canvas, &transform)
            .is_none());
    }

    #[test]
    fn test_project_in_world_space() {
        let mut patches = PlanarPatches::new();
        let id = patches.add_patch(&unit_square_cycle());
        let transform = CanvasTransform::new(2.0, Quat::IDENTITY, Vec3::new(0.0, 0.0, 1.0));

        // Canvas (0.5, 0.5, 0.1) is world (1, 1, 1.2)
        let p = patches
            .project_on_patch(id, Vec3::new(1.0, 1.0, 1.2), Space::World, &transform)
            .unwrap();
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 1.0), 1e-5));
    }

    #[test]
    fn test_detail_draw_notifications() {
        let mut patches = PlanarPatches::new();
        let id = patches.add_patch(&unit_square_cycle());
        patches.on_detail_draw_start(id);
        assert!(patches.patch(id).unwrap().detail_drawing);
        patches.on_detail_draw_stop(id);
        assert!(!patches.patch(id).unwrap().detail_drawing);
    }
}
