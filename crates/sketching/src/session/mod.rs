//! Drawing session
//!
//! This module provides the session object that connects:
//! - Pen input (begin / update / commit / cancel)
//! - Constraint probing against the graph, grid and mirror plane
//! - Curve building, stroke splitting and hook trimming
//! - The node graph and cycle detection
//! - Surface patches and their selection
//!
//! Everything runs synchronously inside the triggering call. The session
//! is the single owner of the graph, the proximity indexes and the cycle
//! state; hosts serializing access to it need no further locking.

mod patches;
mod stroke;

use filigree_config::{ConfigError, SketchParameters};
use glam::Vec3;
use thiserror::Error;
use tracing::info;

use crate::builder::{BuildError, CurveBuilder};
use crate::constraint::{Constraint, ConstraintSet};
use crate::graph::{CycleDetector, CycleUpdate, Graph};
use crate::grid::Grid3D;
use crate::mirror::MirrorPlane;
use crate::reconstruction::ReconstructionError;
use crate::selection::PatchSelection;
use crate::snapping::{self, ProbeContext};
use crate::strokes::{FinalStroke, StrokeStore};
use crate::surface::SurfaceManager;
use crate::types::{PatchId, StrokeId};

pub use stroke::PenSample;

/// Errors raised by session operations called out of order or on bad input
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No stroke in progress")]
    NoActiveStroke,
    #[error("A stroke is already in progress")]
    StrokeInProgress,
    #[error("Unknown stroke {0}")]
    UnknownStroke(StrokeId),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Strokes added or removed by one operation, and the cycles it changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeChange {
    pub strokes: Vec<StrokeId>,
    pub cycles: CycleUpdate,
}

/// One drawing session over a canvas.
///
/// Generic over the host collaborators: `S` builds surface patches, `M` is
/// the mirror plane and `G` the snapping grid.
pub struct SketchSession<S, M, G> {
    /// Parameters in world units, as configured
    pub(crate) base: SketchParameters,
    /// Parameters converted to canvas units
    pub(crate) params: SketchParameters,
    pub(crate) canvas_scale: f32,
    pub(crate) graph: Graph,
    pub(crate) detector: CycleDetector,
    pub(crate) strokes: StrokeStore,
    /// In-progress stroke (None if not drawing)
    pub(crate) active: Option<CurveBuilder>,
    pub(crate) selection: PatchSelection,
    /// Snap onto the mirror plane while drawing
    pub(crate) mirroring: bool,
    pub(crate) surfaces: S,
    pub(crate) mirror: M,
    pub(crate) grid: G,
}

impl<S: SurfaceManager, M: MirrorPlane, G: Grid3D> SketchSession<S, M, G> {
    /// Start a session at canvas scale 1.
    pub fn new(params: SketchParameters, surfaces: S, mirror: M, grid: G) -> Result<Self, SessionError> {
        params.validate()?;
        let scaled = params.scaled(1.0)?;
        let cell = index_cell_size(&scaled);
        Ok(Self {
            detector: CycleDetector::new(params.automatic_surfacing, params.cycle_planarity_tolerance),
            base: params,
            params: scaled,
            canvas_scale: 1.0,
            graph: Graph::new(cell),
            strokes: StrokeStore::new(cell),
            active: None,
            selection: PatchSelection::new(),
            mirroring: false,
            surfaces,
            mirror,
            grid,
        })
    }

    /// Parameters in world units
    pub fn base_parameters(&self) -> &SketchParameters {
        &self.base
    }

    /// Parameters in canvas units for the current scale
    pub fn parameters(&self) -> &SketchParameters {
        &self.params
    }

    pub fn canvas_scale(&self) -> f32 {
        self.canvas_scale
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn cycles(&self) -> &CycleDetector {
        &self.detector
    }

    pub fn strokes(&self) -> &StrokeStore {
        &self.strokes
    }

    pub fn stroke(&self, id: StrokeId) -> Option<&FinalStroke> {
        self.strokes.get(id)
    }

    pub fn surfaces(&self) -> &S {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut S {
        &mut self.surfaces
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Constraints of the in-progress stroke.
    pub fn active_constraints(&self) -> Option<&ConstraintSet> {
        self.active.as_ref().map(|b| b.constraints())
    }

    pub fn selected_patch(&self) -> Option<PatchId> {
        self.selection.selected()
    }

    pub fn is_mirroring(&self) -> bool {
        self.mirroring
    }

    /// Enable snapping onto the mirror plane while drawing.
    pub fn set_mirroring(&mut self, mirroring: bool) {
        self.mirroring = mirroring;
    }

    /// Rescale the canvas.
    ///
    /// Thresholds are recomputed in canvas units, the proximity indexes
    /// rebucketed, the grid told and stroke widths updated.
    pub fn apply_canvas_scale(&mut self, scale: f32) -> Result<(), SessionError> {
        self.params = self.base.scaled(scale)?;
        self.canvas_scale = scale;

        let cell = index_cell_size(&self.params);
        self.graph.set_cell_size(cell);
        self.strokes.set_cell_size(cell);
        self.grid.update_scale(scale);

        let (width, constant) = (self.base.base_curve_width, self.base.canvas_space_constant_width);
        for stroke in self.strokes.iter_mut() {
            stroke.rescale_width(width, scale, constant);
        }
        info!("SketchSession::apply_canvas_scale: {}", scale);
        Ok(())
    }

    /// Recompute cycles and hand the differences to the surface manager.
    ///
    /// Added cycles come back with the patch ids built for them.
    pub fn graph_update(&mut self) -> CycleUpdate {
        self.detector.try_find_all_cycles(&self.graph);
        self.publish_cycles()
    }

    /// Drop every stroke, node, cycle and mirror pair.
    ///
    /// An in-progress stroke is discarded. Returns the cycles removed.
    pub fn clear(&mut self) -> CycleUpdate {
        self.cancel_stroke();
        if let Some(patch) = self.selection.deselect() {
            self.surfaces.on_detail_draw_stop(patch);
        }

        let removed = self.detector.clear();
        for patch in removed.iter().filter_map(|c| c.patch) {
            self.surfaces.delete_patch(patch);
        }
        self.graph.clear();
        self.strokes.clear();
        self.mirror.clear_pairs();
        info!("SketchSession::clear: removed {} cycles", removed.len());
        CycleUpdate {
            added: Vec::new(),
            removed,
        }
    }

    /// Diff the detector and sync patches with the result.
    pub(crate) fn publish_cycles(&mut self) -> CycleUpdate {
        let mut update = self.detector.update();
        for cycle in &update.removed {
            if let Some(patch) = cycle.patch {
                self.surfaces.delete_patch(patch);
                if self.selection.selected() == Some(patch) {
                    self.selection.deselect();
                }
            }
        }
        for cycle in &mut update.added {
            let patch = self.surfaces.add_patch(cycle);
            self.detector.assign_patch(&cycle.key(), patch);
            cycle.patch = Some(patch);
        }
        update
    }

    /// Best constraint candidate around a canvas position.
    pub(crate) fn probe_constraint(&self, position: Vec3) -> Option<Constraint> {
        let ctx = ProbeContext {
            graph: &self.graph,
            strokes: &self.strokes,
            mirror: self.mirroring.then_some(&self.mirror),
            grid: &self.grid,
            snap_to_node: self.params.snap_to_existing_node_threshold,
            proximity: self.params.proximity_threshold,
            max_curve_segment: self.max_curve_segment(),
        };
        snapping::probe(position, &ctx)
    }

    /// Upper bound on the segment length of built curves.
    pub(crate) fn max_curve_segment(&self) -> f32 {
        self.params.min_segment_length * 2.0
    }
}

fn index_cell_size(params: &SketchParameters) -> f32 {
    params
        .proximity_threshold
        .max(params.snap_to_existing_node_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EPS;
    use crate::grid::LatticeGrid;
    use crate::mirror::SymmetryPlane;
    use crate::reconstruction::{OrientedPoint, SurfaceReconstructor, TriangleMesh};
    use crate::surface::PlanarPatches;
    use crate::types::{CanvasTransform, NodeId};
    use glam::Quat;

    pub(super) type Session = SketchSession<PlanarPatches, SymmetryPlane, LatticeGrid>;

    pub(super) fn session_with(params: SketchParameters) -> Session {
        SketchSession::new(
            params,
            PlanarPatches::new(),
            SymmetryPlane::default(),
            LatticeGrid::default(),
        )
        .unwrap()
    }

    pub(super) fn session() -> Session {
        session_with(SketchParameters::default())
    }

    /// Draw and commit a stroke through `points` (world = canvas).
    pub(super) fn draw(session: &mut Session, points: &[Vec3], mirror: bool) -> StrokeChange {
        let t = CanvasTransform::default();
        session.begin_stroke(points[0], &t).unwrap();
        for (i, p) in points.iter().enumerate() {
            session
                .update_stroke(&PenSample::at(*p, i as f32 * 0.01), &t)
                .unwrap();
        }
        session.commit_stroke(mirror).unwrap()
    }

    pub(super) fn v(x: f32, y: f32) -> Vec3 {
        Vec3::new(x, y, 0.0)
    }

    // Triangle between grid points A, B, C, sampled to stay clear of
    // other grid points and of the strokes already drawn.
    pub(super) fn triangle(session: &mut Session) -> Vec<StrokeChange> {
        vec![
            draw(session, &[v(0.2, 0.0), v(0.25, 0.0), v(0.35, 0.0), v(0.4, 0.0)], false),
            draw(session, &[v(0.4, 0.0), v(0.375, 0.05), v(0.325, 0.15), v(0.3, 0.2)], false),
            draw(session, &[v(0.3, 0.2), v(0.275, 0.15), v(0.225, 0.05), v(0.2, 0.0)], false),
        ]
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let params = SketchParameters {
            proximity_threshold: -1.0,
            ..Default::default()
        };
        let result = SketchSession::new(
            params,
            PlanarPatches::new(),
            SymmetryPlane::default(),
            LatticeGrid::default(),
        );
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_open_stroke_between_grid_points() {
        let mut session = session();
        let change = draw(
            &mut session,
            &[v(0.2, 0.1), v(0.2, 0.13), v(0.2, 0.17), v(0.2, 0.2)],
            false,
        );

        assert_eq!(change.strokes.len(), 1);
        assert_eq!(session.graph().node_count(), 2);
        assert_eq!(session.graph().segment_count(), 1);
        assert!(change.cycles.is_empty());

        let stroke = session.stroke(change.strokes[0]).unwrap();
        let curve = &stroke.curve;
        assert!(curve.evaluate(0.0).abs_diff_eq(v(0.2, 0.1), 1e-5));
        assert!(curve.evaluate(1.0).abs_diff_eq(v(0.2, 0.2), 1e-5));
    }

    #[test]
    fn test_constraints_lie_on_committed_curve() {
        let mut session = session();
        let change = draw(
            &mut session,
            &[v(0.2, 0.1), v(0.21, 0.13), v(0.19, 0.17), v(0.2, 0.2)],
            false,
        );
        let curve = &session.stroke(change.strokes[0]).unwrap().curve;
        for (i, anchor) in curve.anchors().iter().enumerate() {
            let t = curve.anchor_parameter(i).unwrap();
            assert!(
                curve
                    .evaluate(t)
                    .abs_diff_eq(anchor.constraint.position(), crate::constants::EPS)
            );
        }
    }

    #[test]
    fn test_triangle_adds_exactly_one_cycle() {
        let mut session = session();
        let changes = triangle(&mut session);

        assert!(changes[0].cycles.is_empty());
        assert!(changes[1].cycles.is_empty());
        assert_eq!(changes[2].cycles.added.len(), 1);
        assert!(changes[2].cycles.removed.is_empty());

        assert_eq!(session.graph().node_count(), 3);
        assert_eq!(session.graph().segment_count(), 3);
        let cycle = &changes[2].cycles.added[0];
        let mut nodes = cycle.nodes.clone();
        nodes.sort();
        let mut all: Vec<NodeId> = session.graph().nodes().map(|n| n.id).collect();
        all.sort();
        assert_eq!(nodes, all);
        assert!(cycle.patch.is_some());
        assert_eq!(session.surfaces().len(), 1);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut session = session();
        triangle(&mut session);
        assert!(session.graph_update().is_empty());
        assert!(session.graph_update().is_empty());
    }

    #[test]
    fn test_delete_removes_only_own_segments() {
        let mut session = session();
        let changes = triangle(&mut session);
        let before: Vec<NodeId> = session.graph().nodes().map(|n| n.id).collect();

        let removed = session.delete_stroke(changes[1].strokes[0], false).unwrap();
        assert_eq!(removed.strokes, changes[1].strokes);
        assert_eq!(removed.cycles.removed.len(), 1);
        assert_eq!(session.surfaces().len(), 0);

        // The two other strokes still share all three nodes
        assert_eq!(session.graph().segment_count(), 2);
        let after: Vec<NodeId> = session.graph().nodes().map(|n| n.id).collect();
        assert_eq!(before, after);
        for change in [&changes[0], &changes[2]] {
            assert_eq!(session.graph().stroke_segments(change.strokes[0]).len(), 1);
        }
    }

    #[test]
    fn test_delete_unknown_stroke() {
        let mut session = session();
        assert!(matches!(
            session.delete_stroke(StrokeId(7), true),
            Err(SessionError::UnknownStroke(StrokeId(7)))
        ));
    }

    fn mirrored_pair(session: &mut Session) -> (StrokeId, StrokeId) {
        let change = draw(
            session,
            &[v(0.2, 0.1), v(0.25, 0.1), v(0.35, 0.1), v(0.4, 0.1)],
            true,
        );
        assert_eq!(change.strokes.len(), 2);
        (change.strokes[0], change.strokes[1])
    }

    #[test]
    fn test_mirrored_commit() {
        let mut session = session();
        let (a, b) = mirrored_pair(&mut session);
        assert_eq!(session.mirror().try_get_symmetric(a), Some(b));
        assert_eq!(session.stroke(b).unwrap().mirror_of, Some(a));

        let twin = &session.stroke(b).unwrap().curve;
        assert!(twin.evaluate(0.0).abs_diff_eq(v(-0.2, 0.1), 1e-5));
        assert!(twin.evaluate(1.0).abs_diff_eq(v(-0.4, 0.1), 1e-5));
        assert_eq!(session.graph().segment_count(), 2);
    }

    #[test]
    fn test_delete_mirrored_pair() {
        let mut session = session();
        let (a, _) = mirrored_pair(&mut session);
        let removed = session.delete_stroke(a, true).unwrap();
        assert_eq!(removed.strokes.len(), 2);
        assert!(session.strokes().is_empty());
        assert_eq!(session.graph().node_count(), 0);
    }

    #[test]
    fn test_delete_keeps_mirror_when_not_mirroring() {
        let mut session = session();
        let (a, b) = mirrored_pair(&mut session);
        let removed = session.delete_stroke(a, false).unwrap();
        assert_eq!(removed.strokes, vec![a]);
        assert!(session.stroke(b).is_some());
        assert_eq!(session.graph().stroke_segments(b).len(), 1);
        assert_eq!(session.graph().node_count(), 2);
        assert_eq!(session.mirror().try_get_symmetric(b), None);
    }

    #[test]
    fn test_stroke_on_plane_is_its_own_mirror() {
        let mut session = session();
        let change = draw(
            &mut session,
            &[v(0.0, 0.15), v(0.0, 0.25), v(0.0, 0.35)],
            true,
        );
        assert_eq!(change.strokes.len(), 1);
        let id = change.strokes[0];
        assert_eq!(session.mirror().try_get_symmetric(id), Some(id));
    }

    #[test]
    fn test_crossing_stroke_splits_existing_one() {
        let mut session = session();
        let first = draw(
            &mut session,
            &[v(0.1, 0.2), v(0.15, 0.2), v(0.25, 0.2), v(0.35, 0.2), v(0.4, 0.2)],
            false,
        );
        assert_eq!(session.graph().segment_count(), 1);
        let first_id = first.strokes[0];
        let length = session.stroke(first_id).unwrap().curve.length();

        // From a grid point down onto the first stroke, away from its nodes
        let second = draw(
            &mut session,
            &[
                v(0.2, 0.4),
                v(0.2125, 0.35),
                v(0.23, 0.28),
                v(0.24, 0.24),
                v(0.25, 0.205),
            ],
            false,
        );
        assert_eq!(session.graph().stroke_segments(first_id).len(), 2);
        assert_eq!(session.stroke(first_id).unwrap().curve.anchors().len(), 3);
        let junction = session
            .graph()
            .nearest_node(v(0.25, 0.2), 0.01)
            .expect("junction node");
        assert_eq!(session.graph().degree(junction), 3);
        assert_eq!(session.graph().node_count(), 4);

        // The crossed stroke keeps its shape and the junction lies on it
        let crossed = &session.stroke(first_id).unwrap().curve;
        assert!((crossed.length() - length).abs() < 1e-6);
        let position = session.graph().node(junction).unwrap().position;
        assert!(crossed.closest_point(position).unwrap().distance < EPS);

        // Stored constraints follow the anchors, including the new junction
        for id in [first_id, second.strokes[0]] {
            let stroke = session.stroke(id).unwrap();
            let anchored: Vec<Constraint> =
                stroke.curve.anchors().iter().map(|a| a.constraint).collect();
            assert_eq!(stroke.constraints.as_slice(), anchored.as_slice());
        }
        let crossing = session.stroke(second.strokes[0]).unwrap();
        assert_eq!(crossing.constraints.last().and_then(|c| c.node()), Some(junction));
    }

    #[test]
    fn test_begin_twice_and_commit_without_stroke() {
        let mut session = session();
        let t = CanvasTransform::default();
        assert!(matches!(
            session.commit_stroke(false),
            Err(SessionError::NoActiveStroke)
        ));
        session.begin_stroke(v(0.5, 0.5), &t).unwrap();
        assert!(matches!(
            session.begin_stroke(v(0.5, 0.5), &t),
            Err(SessionError::StrokeInProgress)
        ));
    }

    #[test]
    fn test_commit_needs_two_samples() {
        let mut session = session();
        let t = CanvasTransform::default();
        session.begin_stroke(v(0.55, 0.55), &t).unwrap();
        session
            .update_stroke(&PenSample::at(v(0.55, 0.55), 0.0), &t)
            .unwrap();
        assert!(matches!(
            session.commit_stroke(false),
            Err(SessionError::Build(BuildError::TooFewSamples(1)))
        ));
        assert!(!session.is_drawing());
        assert_eq!(session.graph().node_count(), 0);
    }

    #[test]
    fn test_cancel_leaves_graph_untouched() {
        let mut session = session();
        let t = CanvasTransform::default();
        session.begin_stroke(v(0.2, 0.1), &t).unwrap();
        for (i, y) in [0.1, 0.15, 0.2].into_iter().enumerate() {
            session
                .update_stroke(&PenSample::at(v(0.2, y), i as f32), &t)
                .unwrap();
        }
        session.cancel_stroke();
        assert!(!session.is_drawing());
        assert_eq!(session.graph().node_count(), 0);
        assert!(session.strokes().is_empty());
    }

    #[test]
    fn test_live_preview_after_two_samples() {
        let mut session = session();
        let t = CanvasTransform::default();
        session.begin_stroke(v(0.55, 0.55), &t).unwrap();
        let first = session
            .update_stroke(&PenSample::at(v(0.55, 0.55), 0.0), &t)
            .unwrap();
        assert!(first.is_none());
        // Too close to the previous sample
        let rejected = session
            .update_stroke(&PenSample::at(v(0.5505, 0.55), 0.01), &t)
            .unwrap();
        assert!(rejected.is_none());
        let preview = session
            .update_stroke(&PenSample::at(v(0.6, 0.55), 0.02), &t)
            .unwrap()
            .unwrap();
        assert!(preview.evaluate(1.0).abs_diff_eq(v(0.6, 0.55), 1e-5));
    }

    #[test]
    fn test_update_without_stroke() {
        let mut session = session();
        let t = CanvasTransform::default();
        assert!(matches!(
            session.update_stroke(&PenSample::at(Vec3::ZERO, 0.0), &t),
            Err(SessionError::NoActiveStroke)
        ));
    }

    #[test]
    fn test_world_input_goes_through_canvas_transform() {
        let mut session = session();
        let t = CanvasTransform::new(2.0, Quat::IDENTITY, Vec3::new(1.0, 0.0, 0.0));
        session.apply_canvas_scale(2.0).unwrap();

        // Canvas (0.2, 0.1) .. (0.2, 0.2) in world space
        let world = |p: Vec3| t.to_world_point(p);
        session.begin_stroke(world(v(0.2, 0.1)), &t).unwrap();
        for (i, y) in [0.1, 0.13, 0.17, 0.2].into_iter().enumerate() {
            session
                .update_stroke(&PenSample::at(world(v(0.2, y)), i as f32), &t)
                .unwrap();
        }
        let change = session.commit_stroke(false).unwrap();
        let curve = &session.stroke(change.strokes[0]).unwrap().curve;
        assert!(curve.evaluate(0.0).abs_diff_eq(v(0.2, 0.1), 1e-5));
        assert_eq!(session.graph().node_count(), 2);
    }

    #[test]
    fn test_canvas_scale_updates_widths_and_thresholds() {
        let mut session = session();
        let change = draw(&mut session, &[v(0.2, 0.1), v(0.2, 0.15), v(0.2, 0.2)], false);
        let id = change.strokes[0];
        assert!((session.stroke(id).unwrap().width - 0.005).abs() < 1e-7);

        session.apply_canvas_scale(2.0).unwrap();
        assert!((session.stroke(id).unwrap().width - 0.01).abs() < 1e-7);
        assert!((session.parameters().proximity_threshold - 0.01).abs() < 1e-7);
        assert!((session.grid().world_spacing() - 0.2).abs() < 1e-6);
        assert!(matches!(
            session.apply_canvas_scale(0.0),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_clear_removes_patches() {
        let mut session = session();
        triangle(&mut session);
        let update = session.clear();
        assert_eq!(update.removed.len(), 1);
        assert!(session.surfaces().is_empty());
        assert_eq!(session.graph().node_count(), 0);
        assert!(session.strokes().is_empty());
        assert!(session.graph_update().is_empty());
    }

    struct FanReconstructor;

    impl SurfaceReconstructor for FanReconstructor {
        fn reconstruct(&mut self, points: &[OrientedPoint], _: usize, _: usize) -> TriangleMesh {
            if points.len() < 3 {
                return TriangleMesh::default();
            }
            TriangleMesh {
                vertices: points.iter().map(|p| Vec3::from(p.position)).collect(),
                triangles: (1..points.len() as u32 - 1).map(|i| [0, i, i + 1]).collect(),
            }
        }
    }

    #[test]
    fn test_reconstruct_surface() {
        let mut session = session();
        assert!(matches!(
            session.reconstruct_surface(&mut FanReconstructor),
            Err(SessionError::Reconstruction(ReconstructionError::EmptyInput))
        ));

        triangle(&mut session);
        let mesh = session
            .reconstruct_surface(&mut FanReconstructor)
            .unwrap()
            .unwrap();
        assert_eq!(mesh.vertices.len(), 12);
        assert_eq!(mesh.triangles.len(), 10);
    }
}
