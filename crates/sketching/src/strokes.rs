//! Committed strokes and curve proximity lookups.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::constraint::ConstraintSet;
use crate::curve::Curve;
use crate::spatial::ProximityIndex;
use crate::types::{NodeId, Sample, StrokeId};

/// A committed stroke.
///
/// Immutable once stored except for its display width and for anchors
/// inserted where later strokes cross it.
#[derive(Debug, Clone)]
pub struct FinalStroke {
    pub id: StrokeId,
    pub curve: Curve,
    pub samples: Vec<Sample>,
    /// Constraints of the curve anchors, in order
    pub constraints: ConstraintSet,
    /// Graph node of each curve anchor (empty if the stroke added no segments)
    pub anchor_nodes: Vec<NodeId>,
    /// The stroke generated as this one's mirror image, if any
    pub mirror_of: Option<StrokeId>,
    pub width: f32,
}

impl FinalStroke {
    /// Refresh `constraints` after the curve anchors changed.
    pub fn sync_constraints(&mut self) {
        let anchored = self.curve.anchors().iter().map(|a| a.constraint).collect();
        self.constraints = ConstraintSet::from_vec(anchored);
    }

    /// Update the world-space display width for a canvas scale.
    ///
    /// With `canvas_space_constant` the stroke grows and shrinks with the
    /// canvas, otherwise it keeps the same width on screen.
    pub fn rescale_width(&mut self, base_width: f32, canvas_scale: f32, canvas_space_constant: bool) {
        self.width = if canvas_space_constant {
            base_width * canvas_scale
        } else {
            base_width
        };
    }
}

/// Closest point on a committed stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveHit {
    pub stroke: StrokeId,
    pub t: f32,
    pub position: Vec3,
    pub distance: f32,
}

/// Owner of every committed stroke.
///
/// Curve vertices are indexed so that point queries only look at strokes
/// passing nearby.
#[derive(Debug, Clone)]
pub struct StrokeStore {
    strokes: BTreeMap<StrokeId, FinalStroke>,
    vertices: ProximityIndex<(StrokeId, u32)>,
    next_id: u32,
}

impl StrokeStore {
    pub fn new(cell_size: f32) -> Self {
        Self {
            strokes: BTreeMap::new(),
            vertices: ProximityIndex::new(cell_size),
            next_id: 0,
        }
    }

    /// Reserve the id for the next stroke.
    pub fn next_id(&mut self) -> StrokeId {
        let id = StrokeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, stroke: FinalStroke) {
        self.index_curve(stroke.id, &stroke.curve);
        self.strokes.insert(stroke.id, stroke);
    }

    pub fn remove(&mut self, id: StrokeId) -> Option<FinalStroke> {
        let stroke = self.strokes.remove(&id)?;
        self.unindex_curve(id, &stroke.curve);
        Some(stroke)
    }

    pub fn get(&self, id: StrokeId) -> Option<&FinalStroke> {
        self.strokes.get(&id)
    }

    /// Mutable access; call [`StrokeStore::reindex`] after changing the curve.
    pub fn get_mut(&mut self, id: StrokeId) -> Option<&mut FinalStroke> {
        self.strokes.get_mut(&id)
    }

    pub fn contains(&self, id: StrokeId) -> bool {
        self.strokes.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FinalStroke> {
        self.strokes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FinalStroke> {
        self.strokes.values_mut()
    }

    pub fn ids(&self) -> Vec<StrokeId> {
        self.strokes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Refresh the vertex index of a stroke whose curve changed.
    pub fn reindex(&mut self, id: StrokeId, old_curve: &Curve) {
        self.unindex_curve(id, old_curve);
        if let Some(stroke) = self.strokes.get(&id) {
            let curve = stroke.curve.clone();
            self.index_curve(id, &curve);
        }
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.vertices.set_cell_size(cell_size);
    }

    /// Closest curve point of each stroke with a vertex within `radius`,
    /// nearest first.
    ///
    /// Curve segments can be longer than `radius`, so candidate strokes are
    /// found with the padded radius and the exact distance checked after.
    pub fn closest_on_curves(&self, position: Vec3, radius: f32, max_segment: f32) -> Vec<CurveHit> {
        let mut candidates: Vec<StrokeId> = self
            .vertices
            .query(position, radius + max_segment)
            .into_iter()
            .map(|(stroke, _)| stroke)
            .collect();
        candidates.sort();
        candidates.dedup();

        let mut hits: Vec<CurveHit> = candidates
            .into_iter()
            .filter_map(|id| {
                let stroke = self.strokes.get(&id)?;
                let closest = stroke.curve.closest_point(position)?;
                (closest.distance <= radius).then_some(CurveHit {
                    stroke: id,
                    t: closest.t,
                    position: closest.position,
                    distance: closest.distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.stroke.cmp(&b.stroke)));
        hits
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.vertices.clear();
    }

    fn index_curve(&mut self, id: StrokeId, curve: &Curve) {
        for (i, p) in curve.points().iter().enumerate() {
            self.vertices.insert((id, i as u32), *p);
        }
    }

    fn unindex_curve(&mut self, id: StrokeId, curve: &Curve) {
        for i in 0..curve.vertex_count() {
            self.vertices.remove((id, i as u32));
        }
    }
}
