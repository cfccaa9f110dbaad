//! Which surface patch the pen is drawing on.

use glam::Vec3;
use tracing::debug;

use crate::surface::SurfaceManager;
use crate::types::{CanvasTransform, PatchId, Space};

/// The currently selected patch, if any.
///
/// A patch gets selected when the pen collides with it. It stays selected
/// while the pen projects onto it within the proximity radius; colliding
/// with another patch only switches over once the selected one has been
/// left behind. All positions are in canvas space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSelection {
    selected: Option<PatchId>,
}

impl PatchSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<PatchId> {
        self.selected
    }

    /// Whether `position` is close enough to `patch` to draw on it.
    pub fn holds<S: SurfaceManager + ?Sized>(
        surfaces: &S,
        patch: PatchId,
        position: Vec3,
        transform: &CanvasTransform,
        proximity: f32,
    ) -> bool {
        surfaces
            .project_on_patch(patch, position, Space::Canvas, transform)
            .is_some_and(|p| p.distance(position) <= proximity)
    }

    /// The pen touched `patch`.
    ///
    /// Returns the patch if it became the selection.
    pub fn on_patch_collide<S: SurfaceManager + ?Sized>(
        &mut self,
        patch: PatchId,
        position: Vec3,
        surfaces: &S,
        transform: &CanvasTransform,
        proximity: f32,
    ) -> Option<PatchId> {
        match self.selected {
            Some(current) if current == patch => None,
            Some(current) if Self::holds(surfaces, current, position, transform, proximity) => None,
            previous => {
                debug!("PatchSelection::on_patch_collide: {:?} -> {}", previous, patch);
                self.selected = Some(patch);
                Some(patch)
            }
        }
    }

    /// Drop the selection if the pen moved away from it.
    ///
    /// Returns the patch that was deselected.
    pub fn refresh<S: SurfaceManager + ?Sized>(
        &mut self,
        position: Vec3,
        surfaces: &S,
        transform: &CanvasTransform,
        proximity: f32,
    ) -> Option<PatchId> {
        let current = self.selected?;
        if Self::holds(surfaces, current, position, transform, proximity) {
            return None;
        }
        self.deselect()
    }

    pub fn deselect(&mut self) -> Option<PatchId> {
        self.selected.take()
    }
}
