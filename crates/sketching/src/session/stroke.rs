//! Stroke handling for the drawing session

use glam::{Quat, Vec3};
use tracing::{debug, info, trace};

use crate::builder::{trim_dangling_endpoints, CurveBuilder, HookTrim};
use crate::constraint::{Constraint, ConstraintSet};
use crate::curve::Curve;
use crate::grid::Grid3D;
use crate::mirror::MirrorPlane;
use crate::snapping::{self, CollisionTarget};
use crate::strokes::FinalStroke;
use crate::surface::SurfaceManager;
use crate::types::{CanvasTransform, NodeId, Sample, StrokeId};

use super::{SessionError, SketchSession, StrokeChange};

/// Raw pen state for one input event, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenSample {
    pub position: Vec3,
    /// Device orientation
    pub rotation: Quat,
    pub velocity: Vec3,
    /// Pressure 0.0-1.0
    pub pressure: f32,
    /// Host clock, in seconds
    pub time: f32,
}

impl PenSample {
    /// Pen at `position` with identity orientation and full pressure.
    pub fn at(position: Vec3, time: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            pressure: 1.0,
            time,
        }
    }

    /// Canvas-space sample.
    ///
    /// The brush normal is the device's forward axis (-Z) and the tangent
    /// its up axis (+Y).
    pub fn to_canvas_sample(&self, transform: &CanvasTransform) -> Sample {
        Sample {
            position: transform.to_canvas_point(self.position),
            normal: transform.to_canvas_direction(self.rotation * Vec3::NEG_Z),
            tangent: transform.to_canvas_direction(self.rotation * Vec3::Y),
            pressure: self.pressure,
            velocity: self.velocity,
            creation_time: self.time,
        }
    }
}

impl<S: SurfaceManager, M: MirrorPlane, G: Grid3D> SketchSession<S, M, G> {
    /// Begin a stroke at a world position.
    ///
    /// The start point is probed for a constraint, and a selected patch is
    /// entered right away.
    pub fn begin_stroke(&mut self, position: Vec3, transform: &CanvasTransform) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::StrokeInProgress);
        }
        let position = transform.to_canvas_point(position);

        let mut builder = CurveBuilder::new();
        if let Some(constraint) = self.probe_constraint(position) {
            builder.add_constraint(constraint, self.params.merge_constraints_threshold);
        }
        self.active = Some(builder);

        if let Some(patch) = self.selection.selected() {
            self.enter_patch(patch, position, transform);
        }
        debug!("SketchSession::begin_stroke: at {:?}", position);
        Ok(())
    }

    /// Continue the stroke with new pen input.
    ///
    /// Returns the rebuilt preview curve once the stroke has two samples,
    /// `None` while it has fewer or when the sample was too close to the
    /// previous one.
    pub fn update_stroke(
        &mut self,
        pen: &PenSample,
        transform: &CanvasTransform,
    ) -> Result<Option<Curve>, SessionError> {
        let sample = pen.to_canvas_sample(transform);
        let min_distance = self.params.min_sampling_distance;
        let builder = self.active.as_ref().ok_or(SessionError::NoActiveStroke)?;
        if !builder.accepts(sample.position, min_distance) {
            trace!("update_stroke: sample too close, ignoring");
            return Ok(None);
        }

        // Check if the selected patch is still nearby
        self.refresh_selection(sample.position, transform);
        let candidate = self.probe_constraint(sample.position);

        let merge = self.params.merge_constraints_threshold;
        let builder = self.active.as_mut().ok_or(SessionError::NoActiveStroke)?;
        builder.add_sample(sample, min_distance);
        if let Some(constraint) = candidate {
            builder.add_constraint(constraint, merge);
        }

        if builder.sample_count() < 2 {
            return Ok(None);
        }
        Ok(Some(builder.build(self.params.min_segment_length)?))
    }

    /// Offer collisions reported by the host (canvas space) to the stroke.
    ///
    /// Returns `true` if the constraint set changed.
    pub fn add_collision_constraint(&mut self, hits: &[CollisionTarget]) -> bool {
        let Some(builder) = self.active.as_mut() else {
            return false;
        };
        let Some(constraint) = snapping::classify(hits) else {
            return false;
        };
        builder.add_constraint(constraint, self.params.merge_constraints_threshold)
    }

    /// Finish the stroke and add it to the graph.
    ///
    /// With `mirror`, the stroke's mirror image is committed too, unless the
    /// stroke lies on the plane, in which case it is its own mirror. The
    /// stroke is consumed even if building its curve fails.
    pub fn commit_stroke(&mut self, mirror: bool) -> Result<StrokeChange, SessionError> {
        let builder = self.active.take().ok_or(SessionError::NoActiveStroke)?;
        if let Some(patch) = self.selection.selected() {
            self.surfaces.on_detail_draw_stop(patch);
        }

        let on_plane = mirror && self.lies_on_mirror(&builder);
        let twin = (mirror && !on_plane).then(|| self.mirrored(&builder));

        let id = self.commit_builder(builder, None)?;
        let mut strokes = vec![id];
        if on_plane {
            self.mirror.register_pair(id, id);
        }
        if let Some(twin) = twin {
            let twin_id = self.commit_builder(twin, Some(id))?;
            self.mirror.register_pair(id, twin_id);
            strokes.push(twin_id);
        }

        let cycles = self.graph_update();
        info!(
            "SketchSession::commit_stroke: {:?}, {} nodes, {} segments",
            strokes,
            self.graph.node_count(),
            self.graph.segment_count()
        );
        Ok(StrokeChange { strokes, cycles })
    }

    /// Discard the stroke in progress without touching the graph.
    ///
    /// Returns `false` if there was none.
    pub fn cancel_stroke(&mut self) -> bool {
        if self.active.take().is_none() {
            return false;
        }
        if let Some(patch) = self.selection.selected() {
            self.surfaces.on_detail_draw_stop(patch);
        }
        debug!("SketchSession::cancel_stroke");
        true
    }

    /// Delete a committed stroke, and its mirror image with `mirror`.
    pub fn delete_stroke(&mut self, id: StrokeId, mirror: bool) -> Result<StrokeChange, SessionError> {
        if !self.strokes.contains(id) {
            return Err(SessionError::UnknownStroke(id));
        }
        let symmetric = self.mirror.try_get_symmetric(id);

        let mut strokes = vec![id];
        self.remove_stroke(id);
        if mirror {
            if let Some(other) = symmetric.filter(|s| *s != id && self.strokes.contains(*s)) {
                self.remove_stroke(other);
                strokes.push(other);
            }
        }

        let cycles = self.graph_update();
        info!("SketchSession::delete_stroke: removed {:?}", strokes);
        Ok(StrokeChange { strokes, cycles })
    }

    fn remove_stroke(&mut self, id: StrokeId) {
        self.graph.remove_stroke_segments(id);
        self.strokes.remove(id);
        self.mirror.unlink(id);
    }

    /// Build, split, trim and store one stroke.
    fn commit_builder(
        &mut self,
        builder: CurveBuilder,
        mirror_of: Option<StrokeId>,
    ) -> Result<StrokeId, SessionError> {
        let mut curve = builder.build(self.params.min_segment_length)?;
        self.split_crossed_strokes(&mut curve);
        let trims = trim_dangling_endpoints(&mut curve, HookTrim::from_parameters(&self.params));

        let id = self.strokes.next_id();
        let anchor_nodes = self
            .graph
            .add_stroke_segments(id, &curve, self.params.small_distance);
        let (samples, _) = builder.into_parts();

        let mut stroke = FinalStroke {
            id,
            curve,
            samples,
            constraints: ConstraintSet::new(),
            anchor_nodes,
            mirror_of,
            width: self.base.base_curve_width,
        };
        stroke.sync_constraints();
        stroke.rescale_width(
            self.base.base_curve_width,
            self.canvas_scale,
            self.base.canvas_space_constant_width,
        );
        debug!(
            "commit_builder: stroke {} with {} anchors ({} hooks trimmed)",
            id,
            stroke.curve.anchors().len(),
            trims.len()
        );
        self.strokes.insert(stroke);
        Ok(id)
    }

    /// Turn free anchors lying on committed strokes into shared nodes.
    ///
    /// The crossed stroke gets an anchor at the crossing and its segments
    /// are rebuilt around it.
    fn split_crossed_strokes(&mut self, curve: &mut Curve) {
        let radius = self.params.proximity_threshold;
        let max_segment = self.max_curve_segment();
        for i in 0..curve.anchors().len() {
            let Constraint::Free { position } = curve.anchors()[i].constraint else {
                continue;
            };
            let Some(hit) = self
                .strokes
                .closest_on_curves(position, radius, max_segment)
                .into_iter()
                .next()
            else {
                continue;
            };
            let Some(node) = self.split_stroke_at(hit.stroke, hit.t) else {
                continue;
            };
            if let Some(n) = self.graph.node(node) {
                curve.set_anchor_constraint(
                    i,
                    Constraint::NodeSnap {
                        position: n.position,
                        node,
                    },
                );
            }
        }
    }

    /// Pin stroke `id` at `t` and return the node there.
    ///
    /// The node lies on the crossed curve; its shape is not changed.
    fn split_stroke_at(&mut self, id: StrokeId, t: f32) -> Option<NodeId> {
        let snap = self.params.cut_snap_distance();
        let weld = self.params.small_distance;
        let stroke = self.strokes.get_mut(id)?;
        let old_curve = stroke.curve.clone();

        let on_curve = stroke.curve.evaluate(t);
        let (anchor, _) = stroke
            .curve
            .insert_anchor(t, Constraint::free(on_curve), snap);
        stroke.anchor_nodes = self.graph.rebuild_stroke_segments(id, &stroke.curve, weld);
        stroke.sync_constraints();
        let node = stroke.anchor_nodes.get(anchor).copied();

        self.strokes.reindex(id, &old_curve);
        trace!("split_stroke_at: stroke {} at t={} -> {:?}", id, t, node);
        node
    }

    fn lies_on_mirror(&self, builder: &CurveBuilder) -> bool {
        let tolerance = self.params.small_distance;
        builder
            .samples()
            .iter()
            .all(|s| self.mirror.signed_distance(s.position).abs() <= tolerance)
    }

    /// The builder reflected through the mirror plane.
    ///
    /// Node snaps become free points, since the mirrored node may not exist;
    /// they weld onto it when it does.
    fn mirrored(&self, builder: &CurveBuilder) -> CurveBuilder {
        let plane = &self.mirror;
        builder.mapped(
            |s| Sample {
                position: plane.mirror(s.position),
                normal: plane.mirror_direction(s.normal),
                tangent: plane.mirror_direction(s.tangent),
                ..*s
            },
            |c| match *c {
                Constraint::MirrorSnap { .. } => *c,
                other => Constraint::free(plane.mirror(other.position())),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_from_device_pose() {
        let transform = CanvasTransform::new(
            2.0,
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 0.0, 0.0),
        );
        let pen = PenSample {
            rotation: Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            ..PenSample::at(Vec3::new(1.0, 2.0, 0.0), 0.5)
        };
        let sample = pen.to_canvas_sample(&transform);

        assert!(sample.position.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        // Forward turned a quarter about X is world +Y, which is canvas +X
        assert!(sample.normal.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        assert!(sample.tangent.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-5));
        assert_eq!(sample.creation_time, 0.5);
    }
}
