//! Incremental curve fitting for the in-progress stroke.
//!
//! The builder owns the raw samples and the constraints collected while
//! drawing. [`CurveBuilder::build`] turns them into a [`Curve`]:
//!
//! 1. Each constraint is located on the sample polyline, searching forward
//!    from the previous constraint around the sample it arrived with.
//! 2. Samples are displaced by the offsets between located points and
//!    constraint positions, interpolated along the arc length.
//! 3. The constraints are inserted as exact vertices.
//! 4. Every span between anchors is resampled at a uniform step.
//! 5. One Laplacian pass smooths interior points, anchors stay put.
//!
//! After commit, [`trim_dangling_endpoints`] removes short hooks left past
//! the first and last intersections.

use filigree_config::SketchParameters;
use glam::Vec3;
use thiserror::Error;
use tracing::{debug, trace};

use crate::constants::{CONSTRAINT_LOOKAHEAD_SEGMENTS, EPS};
use crate::constraint::{Constraint, ConstraintSet};
use crate::curve::{cumulative_lengths, Anchor, Curve, KeepSide, Reparameterization};
use crate::samples::SampleBuffer;
use crate::types::{PatchId, Sample};

/// Errors raised when a curve cannot be built from the recorded input
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("Need at least two samples to build a curve, got {0}")]
    TooFewSamples(usize),
    #[error("Sample polyline has zero length")]
    ZeroLength,
}

/// Accumulates samples and constraints of one stroke.
#[derive(Debug, Clone, Default)]
pub struct CurveBuilder {
    samples: SampleBuffer,
    constraints: ConstraintSet,
    /// Sample count when each constraint arrived, parallel to `constraints`
    hints: Vec<usize>,
}

/// Where a constraint sits on the raw sample polyline.
#[derive(Debug, Clone, Copy)]
struct Located {
    arc: f32,
    projected: Vec3,
    constraint: Constraint,
}

/// One vertex of the polyline before resampling.
#[derive(Debug, Clone, Copy)]
struct Pinned {
    position: Vec3,
    anchor: Option<Constraint>,
}

impl CurveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample; rejected if closer than `min_distance` to the last one.
    pub fn add_sample(&mut self, sample: Sample, min_distance: f32) -> bool {
        self.samples.add(sample, min_distance)
    }

    /// Whether a sample at `position` would be accepted.
    pub fn accepts(&self, position: Vec3, min_distance: f32) -> bool {
        self.samples.should_accept(position, min_distance)
    }

    /// Offer a constraint to the set.
    pub fn add_constraint(&mut self, candidate: Constraint, merge_threshold: f32) -> bool {
        let changed = self.constraints.add_constraint(candidate, merge_threshold);
        if changed {
            self.sync_hints();
        }
        changed
    }

    pub fn enter_surface(&mut self, patch: PatchId, position: Vec3, merge_threshold: f32) -> bool {
        let changed = self
            .constraints
            .enter_surface(patch, position, merge_threshold);
        if changed {
            self.sync_hints();
        }
        changed
    }

    pub fn exit_surface(&mut self, patch: PatchId, position: Vec3, merge_threshold: f32) -> bool {
        let before = self.constraints.len();
        let changed = self.constraints.exit_surface(patch, position, merge_threshold);
        let after = self.constraints.len();
        if after < before {
            // The entry was cancelled; earlier constraints keep their arrival
            self.hints.truncate(after);
        } else if changed {
            self.sync_hints();
        }
        changed
    }

    // The most recently touched constraint always arrived with the latest sample.
    fn sync_hints(&mut self) {
        let len = self.constraints.len();
        let now = self.samples.len();
        self.hints.truncate(len);
        while self.hints.len() < len {
            self.hints.push(now);
        }
        if let Some(last) = self.hints.last_mut() {
            *last = now;
        }
    }

    pub fn samples(&self) -> &[Sample] {
        self.samples.samples()
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Copy of this builder with every sample and constraint transformed.
    ///
    /// Arrival hints are preserved, so the copy locates its constraints the
    /// same way. Used to produce the mirrored twin of a stroke.
    pub fn mapped(
        &self,
        sample_map: impl Fn(&Sample) -> Sample,
        constraint_map: impl Fn(&Constraint) -> Constraint,
    ) -> Self {
        let mut samples = SampleBuffer::new();
        for sample in self.samples.samples() {
            samples.add(sample_map(sample), 0.0);
        }
        Self {
            samples,
            constraints: ConstraintSet::from_vec(
                self.constraints.iter().map(constraint_map).collect(),
            ),
            hints: self.hints.clone(),
        }
    }

    /// Split into the recorded samples and constraints.
    pub fn into_parts(self) -> (Vec<Sample>, ConstraintSet) {
        (self.samples.into_samples(), self.constraints)
    }

    /// Fit a curve through the samples that passes exactly through every
    /// constraint.
    pub fn build(&self, min_segment_length: f32) -> Result<Curve, BuildError> {
        let positions = self.samples.positions();
        if positions.len() < 2 {
            return Err(BuildError::TooFewSamples(positions.len()));
        }
        let arc = cumulative_lengths(&positions);
        if arc[arc.len() - 1] <= EPS {
            return Err(BuildError::ZeroLength);
        }

        let located = self.locate_constraints(&positions, &arc);
        let displaced = displace(&positions, &arc, &located);
        let pinned = pin_anchors(&displaced, &arc, &located);
        if pinned.len() < 2 {
            return Err(BuildError::ZeroLength);
        }

        let (mut points, anchors) = resample(&pinned, min_segment_length);
        let mut fixed = vec![false; points.len()];
        fixed[0] = true;
        if let Some(last) = fixed.last_mut() {
            *last = true;
        }
        for anchor in &anchors {
            fixed[anchor.vertex] = true;
        }
        laplacian_smooth(&mut points, &fixed);

        trace!(
            "CurveBuilder::build: {} samples, {} anchors -> {} points",
            positions.len(),
            anchors.len(),
            points.len()
        );
        Ok(Curve::new(points, anchors))
    }

    /// Place every constraint on the sample polyline, monotonically in arc length.
    fn locate_constraints(&self, positions: &[Vec3], arc: &[f32]) -> Vec<Located> {
        let last_segment = positions.len() - 2;
        let mut segment = 0;
        let mut min_arc = 0.0f32;
        let mut located = Vec::with_capacity(self.constraints.len());

        for (constraint, &hint) in self.constraints.iter().zip(&self.hints) {
            let target = constraint.position();
            let end = (hint.saturating_sub(1) + CONSTRAINT_LOOKAHEAD_SEGMENTS)
                .min(last_segment)
                .max(segment);

            let mut best_arc = min_arc;
            let mut best_distance = f32::INFINITY;
            for j in segment..=end {
                let (a, b) = (positions[j], positions[j + 1]);
                let ab = b - a;
                let len_sq = ab.length_squared();
                let f = if len_sq <= 0.0 {
                    0.0
                } else {
                    ((target - a).dot(ab) / len_sq).clamp(0.0, 1.0)
                };
                let distance = (a + ab * f).distance(target);
                if distance < best_distance {
                    best_distance = distance;
                    best_arc = arc[j] + f * (arc[j + 1] - arc[j]);
                }
            }

            let s = best_arc.max(min_arc);
            let (projected, seg) = point_at_arc(positions, arc, s);
            located.push(Located {
                arc: s,
                projected,
                constraint: *constraint,
            });
            min_arc = s;
            segment = seg;
        }
        located
    }
}

/// Point at arc length `s` and the index of the segment containing it.
fn point_at_arc(points: &[Vec3], arc: &[f32], s: f32) -> (Vec3, usize) {
    let last_segment = points.len().saturating_sub(2);
    let i = arc
        .partition_point(|&c| c <= s)
        .saturating_sub(1)
        .min(last_segment);
    let seg_len = arc[i + 1] - arc[i];
    if seg_len <= 0.0 {
        return (points[i], i);
    }
    let f = ((s - arc[i]) / seg_len).clamp(0.0, 1.0);
    (points[i].lerp(points[i + 1], f), i)
}

/// Offset samples so the polyline runs through the constraints.
fn displace(positions: &[Vec3], arc: &[f32], located: &[Located]) -> Vec<Vec3> {
    if located.is_empty() {
        return positions.to_vec();
    }
    let delta = |l: &Located| l.constraint.position() - l.projected;
    let first = delta(&located[0]);
    let last = delta(&located[located.len() - 1]);

    positions
        .iter()
        .zip(arc)
        .map(|(&p, &a)| {
            let k = located.partition_point(|l| l.arc <= a);
            let offset = if k == 0 {
                first
            } else if k == located.len() {
                last
            } else {
                let (l0, l1) = (&located[k - 1], &located[k]);
                let span = l1.arc - l0.arc;
                let f = if span > EPS { (a - l0.arc) / span } else { 0.0 };
                delta(l0).lerp(delta(l1), f)
            };
            p + offset
        })
        .collect()
}

/// Merge displaced samples and constraint positions in arc-length order.
///
/// A sample within `EPS` of a constraint's arc length is replaced by it.
fn pin_anchors(displaced: &[Vec3], arc: &[f32], located: &[Located]) -> Vec<Pinned> {
    let mut pinned = Vec::with_capacity(displaced.len() + located.len());
    let mut k = 0;
    for (&position, &a) in displaced.iter().zip(arc) {
        while k < located.len() && located[k].arc <= a + EPS {
            pinned.push(Pinned {
                position: located[k].constraint.position(),
                anchor: Some(located[k].constraint),
            });
            k += 1;
        }
        let covered = k > 0 && (a - located[k - 1].arc).abs() <= EPS;
        if !covered {
            pinned.push(Pinned {
                position,
                anchor: None,
            });
        }
    }
    for l in &located[k..] {
        pinned.push(Pinned {
            position: l.constraint.position(),
            anchor: Some(l.constraint),
        });
    }
    pinned
}

/// Resample each span between pinned vertices at `spacing`.
fn resample(pinned: &[Pinned], spacing: f32) -> (Vec<Vec3>, Vec<Anchor>) {
    let mut pins: Vec<usize> = vec![0];
    pins.extend(
        pinned
            .iter()
            .enumerate()
            .filter(|(_, p)| p.anchor.is_some())
            .map(|(i, _)| i),
    );
    pins.push(pinned.len() - 1);
    pins.dedup();

    let mut points = vec![pinned[0].position];
    let mut anchors = Vec::new();
    if let Some(constraint) = pinned[0].anchor {
        anchors.push(Anchor {
            constraint,
            vertex: 0,
        });
    }

    for w in pins.windows(2) {
        let span: Vec<Vec3> = pinned[w[0]..=w[1]].iter().map(|p| p.position).collect();
        let span_arc = cumulative_lengths(&span);
        let length = span_arc[span_arc.len() - 1];

        if spacing > 0.0 && length > EPS {
            let count = ((length / spacing).floor() as usize).max(1);
            for j in 1..count {
                let s = length * j as f32 / count as f32;
                points.push(point_at_arc(&span, &span_arc, s).0);
            }
        }
        points.push(pinned[w[1]].position);

        if let Some(constraint) = pinned[w[1]].anchor {
            anchors.push(Anchor {
                constraint,
                vertex: points.len() - 1,
            });
        }
    }
    (points, anchors)
}

/// Pull each free interior point halfway toward the mean of its neighbors.
fn laplacian_smooth(points: &mut [Vec3], fixed: &[bool]) {
    if points.len() < 3 {
        return;
    }
    let original = points.to_vec();
    for i in 1..points.len() - 1 {
        if fixed[i] {
            continue;
        }
        let average = (original[i - 1] + original[i + 1]) * 0.5;
        points[i] = original[i] + (average - original[i]) * 0.5;
    }
}

/// Limits for hook trimming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HookTrim {
    pub max_length: f32,
    pub max_ratio: f32,
    pub snap_threshold: f32,
}

impl HookTrim {
    pub fn from_parameters(params: &SketchParameters) -> Self {
        Self {
            max_length: params.max_hook_section_length,
            max_ratio: params.max_hook_section_stroke_ratio,
            snap_threshold: params.cut_snap_distance(),
        }
    }

    fn is_hook(&self, length: f32, total: f32) -> bool {
        length > EPS && length < self.max_length && length < self.max_ratio * total
    }
}

/// Cut short dangling sections past the first and last intersections.
///
/// Returns the reparameterizations applied, in order; composing them maps
/// any parameter of the input curve onto the trimmed one.
pub fn trim_dangling_endpoints(curve: &mut Curve, trim: HookTrim) -> Vec<Reparameterization> {
    let mut applied = Vec::new();
    if curve.anchors().len() < 2 {
        return applied;
    }

    let first = curve
        .anchors()
        .iter()
        .position(|a| a.constraint.is_intersection());
    let Some(first) = first else {
        return applied;
    };

    if let Some(t) = curve.anchor_parameter(first) {
        let length = curve.length_between(0.0, t);
        if trim.is_hook(length, curve.length()) {
            if let Some(reparam) = curve.cut_at(t, KeepSide::After, trim.snap_threshold) {
                debug!("trim_dangling_endpoints: removed start hook of length {length}");
                applied.push(reparam);
            }
        }
    }

    let last = curve
        .anchors()
        .iter()
        .rposition(|a| a.constraint.is_intersection());
    if let Some(t) = last.and_then(|i| curve.anchor_parameter(i)) {
        let length = curve.length_between(t, 1.0);
        if trim.is_hook(length, curve.length()) {
            if let Some(reparam) = curve.cut_at(t, KeepSide::Before, trim.snap_threshold) {
                debug!("trim_dangling_endpoints: removed end hook of length {length}");
                applied.push(reparam);
            }
        }
    }
    applied
}
