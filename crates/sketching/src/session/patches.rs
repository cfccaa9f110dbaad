//! Surface patches: selection, manual requests and reconstruction

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::graph::CycleUpdate;
use crate::grid::Grid3D;
use crate::mirror::MirrorPlane;
use crate::reconstruction::{gather_points, validate_mesh, SurfaceReconstructor, TriangleMesh};
use crate::selection::PatchSelection;
use crate::surface::SurfaceManager;
use crate::types::{CanvasTransform, PatchId};

use super::{SessionError, SketchSession};

impl<S: SurfaceManager, M: MirrorPlane, G: Grid3D> SketchSession<S, M, G> {
    /// The pen collided with a patch (world position).
    ///
    /// Returns `true` if the patch became the selection. While drawing,
    /// entering a patch adds a surface entry constraint.
    pub fn on_patch_collide(&mut self, patch: PatchId, position: Vec3, transform: &CanvasTransform) -> bool {
        let position = transform.to_canvas_point(position);
        let proximity = self.params.proximity_threshold;
        let Some(selected) =
            self.selection
                .on_patch_collide(patch, position, &self.surfaces, transform, proximity)
        else {
            return false;
        };
        if self.active.is_some() {
            self.enter_patch(selected, position, transform);
        }
        true
    }

    /// The pen stopped colliding with the selected patch.
    ///
    /// Ignored while drawing: the stroke keeps the patch it started on
    /// until it moves out of reach.
    pub fn on_patch_deselect(&mut self) {
        if self.active.is_some() {
            return;
        }
        if let Some(patch) = self.selection.deselect() {
            self.surfaces.on_detail_draw_stop(patch);
        }
    }

    /// Deselect the patch if `position` (canvas) moved away from it.
    pub(crate) fn refresh_selection(&mut self, position: Vec3, transform: &CanvasTransform) {
        let proximity = self.params.proximity_threshold;
        if let Some(patch) = self
            .selection
            .refresh(position, &self.surfaces, transform, proximity)
        {
            debug!("refresh_selection: left {}", patch);
            self.leave_patch(patch, position);
        }
    }

    /// Start drawing on `patch` if `position` (canvas) is within reach.
    pub(crate) fn enter_patch(&mut self, patch: PatchId, position: Vec3, transform: &CanvasTransform) -> bool {
        let proximity = self.params.proximity_threshold;
        if !PatchSelection::holds(&self.surfaces, patch, position, transform, proximity) {
            debug!("enter_patch: {} out of reach", patch);
            self.selection.deselect();
            return false;
        }
        let Some(builder) = self.active.as_mut() else {
            return false;
        };
        self.surfaces.on_detail_draw_start(patch);
        builder.enter_surface(patch, position, self.params.merge_constraints_threshold)
    }

    fn leave_patch(&mut self, patch: PatchId, position: Vec3) {
        self.surfaces.on_detail_draw_stop(patch);
        if let Some(builder) = self.active.as_mut() {
            builder.exit_surface(patch, position, self.params.merge_constraints_threshold);
        }
    }

    /// Look for a cycle around a world position and build a patch for it.
    ///
    /// Segments already bounding a patch are avoided first and allowed on
    /// a second try. With `mirroring`, the mirrored position is tried as
    /// well. Returns `true` if any new cycle was found.
    pub fn try_add_patch_at(&mut self, position: Vec3, mirroring: bool, transform: &CanvasTransform) -> bool {
        let position = transform.to_canvas_point(position);
        let mut found = self.find_cycle_at(position);
        if mirroring {
            let mirrored = self.mirror.mirror(position);
            found |= self.find_cycle_at(mirrored);
        }
        if found {
            self.graph_update();
        }
        found
    }

    fn find_cycle_at(&mut self, position: Vec3) -> bool {
        self.detector.find_cycle_at(&self.graph, position, false)
            || self.detector.find_cycle_at(&self.graph, position, true)
    }

    /// Remove a patch and keep its cycle from being detected again until
    /// its boundary changes.
    pub fn delete_patch(&mut self, patch: PatchId) -> bool {
        if self.detector.delete_patch(patch).is_none() {
            return false;
        }
        self.surfaces.delete_patch(patch);
        if self.selection.selected() == Some(patch) {
            self.selection.deselect();
        }
        info!("SketchSession::delete_patch: {}", patch);
        true
    }

    /// Switch between automatic and manual surfacing.
    pub fn switch_surfacing(&mut self, automatic: bool) -> CycleUpdate {
        self.detector.set_automatic(automatic);
        info!("SketchSession::switch_surfacing: automatic={}", automatic);
        self.graph_update()
    }

    /// Reconstruct a surface from every committed sample.
    ///
    /// Fails when there are no samples. An empty result from the
    /// reconstructor is logged and reported as `None`.
    pub fn reconstruct_surface<R: SurfaceReconstructor + ?Sized>(
        &self,
        reconstructor: &mut R,
    ) -> Result<Option<TriangleMesh>, SessionError> {
        let (positions, normals): (Vec<Vec3>, Vec<Vec3>) = self
            .strokes
            .iter()
            .flat_map(|s| s.samples.iter())
            .map(|s| (s.position, s.normal))
            .unzip();
        let points = gather_points(&positions, &normals)?;

        let max_vertices = self.params.max_reconstruction_vertices;
        let max_faces = self.params.max_reconstruction_faces;
        let mesh = reconstructor.reconstruct(&points, max_vertices, max_faces);
        if mesh.is_empty() {
            warn!(
                "reconstruct_surface: no surface from {} points, skipping",
                points.len()
            );
            return Ok(None);
        }
        validate_mesh(&mesh, max_vertices, max_faces)?;
        info!(
            "reconstruct_surface: {} vertices, {} faces",
            mesh.vertices.len(),
            mesh.triangles.len()
        );
        Ok(Some(mesh))
    }
}
