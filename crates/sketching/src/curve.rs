//! Arc-length parameterized 3D curves anchored at constraints.
//!
//! A [`Curve`] is a dense polyline whose parameter `t ∈ [0, 1]` is the
//! normalized arc length. Every constraint the curve honors is an exact
//! polyline vertex (an [`Anchor`]), so evaluating the curve at an anchor's
//! parameter returns the constraint position.
//!
//! Operations that restructure the curve return a [`Reparameterization`]
//! so that anything holding a parameter on the old curve can remap it
//! without a new closest-point search.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::EPS;
use crate::constraint::Constraint;

/// A constraint pinned to a curve vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub constraint: Constraint,
    /// Index of the curve vertex sitting exactly at the constraint position
    pub vertex: usize,
}

/// Which part of the curve survives a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepSide {
    /// Keep `[0, t]`
    Before,
    /// Keep `[t, 1]`
    After,
}

/// Mapping from parameters of the old curve to parameters of the new one.
///
/// The kept range `[old_start, old_end]` of the old curve becomes `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reparameterization {
    pub old_start: f32,
    pub old_end: f32,
}

impl Reparameterization {
    pub fn identity() -> Self {
        Self {
            old_start: 0.0,
            old_end: 1.0,
        }
    }

    pub fn new(old_start: f32, old_end: f32) -> Self {
        debug_assert!(old_end > old_start);
        Self { old_start, old_end }
    }

    pub fn is_identity(&self) -> bool {
        self.old_start == 0.0 && self.old_end == 1.0
    }

    /// Remap an old parameter; `None` if it fell in the discarded part.
    pub fn apply(&self, t: f32) -> Option<f32> {
        if t < self.old_start - EPS || t > self.old_end + EPS {
            return None;
        }
        let span = self.old_end - self.old_start;
        Some(((t - self.old_start) / span).clamp(0.0, 1.0))
    }
}

/// Result of a closest-point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub t: f32,
    pub position: Vec3,
    pub distance: f32,
}

/// Polyline curve with normalized arc-length parameter and anchors.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: Vec<Vec3>,
    /// Arc length from the first point to each point
    cumulative: Vec<f32>,
    anchors: Vec<Anchor>,
}

impl Curve {
    /// Create a curve from polyline points and anchors sorted by vertex.
    pub fn new(points: Vec<Vec3>, anchors: Vec<Anchor>) -> Self {
        debug_assert!(anchors.iter().all(|a| a.vertex < points.len()));
        debug_assert!(anchors.windows(2).all(|w| w[0].vertex <= w[1].vertex));
        let cumulative = cumulative_lengths(&points);
        Self {
            points,
            cumulative,
            anchors,
        }
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// Replace the constraint of an anchor, keeping its vertex.
    ///
    /// The curve point is moved onto the new constraint position, which
    /// callers keep within snapping distance of the old one.
    pub fn set_anchor_constraint(&mut self, anchor: usize, constraint: Constraint) {
        if let Some(a) = self.anchors.get_mut(anchor) {
            a.constraint = constraint;
            self.points[a.vertex] = constraint.position();
            self.cumulative = cumulative_lengths(&self.points);
        }
    }

    /// Total arc length.
    pub fn length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Arc length between two parameters.
    pub fn length_between(&self, t0: f32, t1: f32) -> f32 {
        (t1.clamp(0.0, 1.0) - t0.clamp(0.0, 1.0)).abs() * self.length()
    }

    /// Parameter of a polyline vertex.
    pub fn parameter_at_vertex(&self, vertex: usize) -> f32 {
        let total = self.length();
        if total <= 0.0 {
            return 0.0;
        }
        self.cumulative[vertex.min(self.cumulative.len() - 1)] / total
    }

    /// Parameter of the anchor at `index`.
    pub fn anchor_parameter(&self, index: usize) -> Option<f32> {
        self.anchors
            .get(index)
            .map(|a| self.parameter_at_vertex(a.vertex))
    }

    /// Position at parameter `t` (clamped to `[0, 1]`).
    pub fn evaluate(&self, t: f32) -> Vec3 {
        match self.points.len() {
            0 => Vec3::ZERO,
            1 => self.points[0],
            _ => {
                let s = t.clamp(0.0, 1.0) * self.length();
                let i = self.segment_at(s);
                let seg_len = self.cumulative[i + 1] - self.cumulative[i];
                if seg_len <= 0.0 {
                    return self.points[i];
                }
                let f = ((s - self.cumulative[i]) / seg_len).clamp(0.0, 1.0);
                self.points[i].lerp(self.points[i + 1], f)
            }
        }
    }

    /// Unit direction leaving `vertex` toward the next (or previous) vertex.
    pub fn direction_at_vertex(&self, vertex: usize, forward: bool) -> Vec3 {
        let n = self.points.len();
        if n < 2 || vertex >= n {
            return Vec3::ZERO;
        }
        let origin = self.points[vertex];
        let walk: Box<dyn Iterator<Item = &Vec3>> = if forward {
            Box::new(self.points[vertex + 1..].iter())
        } else {
            Box::new(self.points[..vertex].iter().rev())
        };
        for p in walk {
            let d = *p - origin;
            if d.length() > EPS {
                return d.normalize();
            }
        }
        Vec3::ZERO
    }

    /// Closest point of the curve to `position`.
    pub fn closest_point(&self, position: Vec3) -> Option<CurvePoint> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 {
            return Some(CurvePoint {
                t: 0.0,
                position: self.points[0],
                distance: self.points[0].distance(position),
            });
        }

        let total = self.length().max(EPS);
        let mut best: Option<CurvePoint> = None;
        for i in 0..self.points.len() - 1 {
            let (a, b) = (self.points[i], self.points[i + 1]);
            let ab = b - a;
            let len_sq = ab.length_squared();
            let f = if len_sq <= 0.0 {
                0.0
            } else {
                ((position - a).dot(ab) / len_sq).clamp(0.0, 1.0)
            };
            let p = a + ab * f;
            let distance = p.distance(position);
            if best.is_none_or(|b| distance < b.distance) {
                let s = self.cumulative[i] + f * (self.cumulative[i + 1] - self.cumulative[i]);
                best = Some(CurvePoint {
                    t: (s / total).clamp(0.0, 1.0),
                    position: p,
                    distance,
                });
            }
        }
        best
    }

    /// Cut the curve at `t`, keeping one side.
    ///
    /// The cut snaps to an existing vertex within `snap_threshold`. Anchors
    /// on the discarded side are dropped. Returns `None` (and leaves the
    /// curve untouched) when `t` is at or beyond either end.
    pub fn cut_at(
        &mut self,
        t: f32,
        keep: KeepSide,
        snap_threshold: f32,
    ) -> Option<Reparameterization> {
        if t <= EPS || t >= 1.0 - EPS || self.points.len() < 2 {
            return None;
        }

        let vertex = self.split_vertex_at(t, snap_threshold);
        let last = self.points.len() - 1;
        if vertex == 0 || vertex == last {
            return None;
        }

        let t_cut = self.parameter_at_vertex(vertex);
        let reparam = match keep {
            KeepSide::After => {
                self.points.drain(..vertex);
                self.anchors.retain(|a| a.vertex >= vertex);
                for a in &mut self.anchors {
                    a.vertex -= vertex;
                }
                Reparameterization::new(t_cut, 1.0)
            }
            KeepSide::Before => {
                self.points.truncate(vertex + 1);
                self.anchors.retain(|a| a.vertex <= vertex);
                Reparameterization::new(0.0, t_cut)
            }
        };
        self.cumulative = cumulative_lengths(&self.points);
        Some(reparam)
    }

    /// Pin a new constraint onto the curve at parameter `t`.
    ///
    /// The curve geometry is left as is: the constraint is moved onto the
    /// curve point at `t` (or the vertex it snaps to), so arc lengths and the
    /// returned mapping stay the identity. Returns the index of the new
    /// anchor, or of the existing anchor already sitting at that vertex.
    pub fn insert_anchor(
        &mut self,
        t: f32,
        constraint: Constraint,
        snap_threshold: f32,
    ) -> (usize, Reparameterization) {
        let vertex = self.split_vertex_at(t, snap_threshold);
        if let Some(existing) = self.anchors.iter().position(|a| a.vertex == vertex) {
            return (existing, Reparameterization::identity());
        }

        let constraint = constraint.with_position(self.points[vertex]);
        let index = self.anchors.partition_point(|a| a.vertex < vertex);
        self.anchors.insert(index, Anchor { constraint, vertex });
        (index, Reparameterization::identity())
    }

    /// Index of the vertex at parameter `t`, inserting one if none is close.
    fn split_vertex_at(&mut self, t: f32, snap_threshold: f32) -> usize {
        let s = t.clamp(0.0, 1.0) * self.length();
        let i = self.segment_at(s);
        let p = self.evaluate(t);
        let snap = snap_threshold.max(EPS);

        if p.distance(self.points[i]) <= snap {
            return i;
        }
        if p.distance(self.points[i + 1]) <= snap {
            return i + 1;
        }

        self.points.insert(i + 1, p);
        for a in &mut self.anchors {
            if a.vertex > i {
                a.vertex += 1;
            }
        }
        self.cumulative = cumulative_lengths(&self.points);
        i + 1
    }

    /// Index of the segment containing arc length `s`.
    fn segment_at(&self, s: f32) -> usize {
        let upper = self.cumulative.partition_point(|&c| c <= s);
        upper.saturating_sub(1).min(self.points.len().saturating_sub(2))
    }
}

pub(crate) fn cumulative_lengths(points: &[Vec3]) -> Vec<f32> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += points[i - 1].distance(*p);
        }
        cumulative.push(total);
    }
    cumulative
}
