//! Geometric constraints attached to a stroke.
//!
//! Constraints are kept in arrival order, which is also the order in which
//! the stroke passes through them. Two consecutive constraints are never
//! closer than the merge threshold: a close candidate either replaces the
//! previous constraint (when strictly more specific) or is dropped.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{NodeId, PatchId};

/// A point a stroke must pass through exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Unattached point (grid point or bare stroke point)
    Free { position: Vec3 },
    /// Snap onto an existing graph node
    NodeSnap { position: Vec3, node: NodeId },
    /// Snap onto the mirror plane
    MirrorSnap { position: Vec3, plane_normal: Vec3 },
    /// The pen entered the projected bounds of a patch
    SurfaceEntry { patch: PatchId, position: Vec3 },
    /// The pen left the projected bounds of a patch
    SurfaceExit { patch: PatchId, position: Vec3 },
}

impl Constraint {
    pub fn free(position: Vec3) -> Self {
        Constraint::Free { position }
    }

    pub fn position(&self) -> Vec3 {
        match *self {
            Constraint::Free { position }
            | Constraint::NodeSnap { position, .. }
            | Constraint::MirrorSnap { position, .. }
            | Constraint::SurfaceEntry { position, .. }
            | Constraint::SurfaceExit { position, .. } => position,
        }
    }

    /// The same constraint moved to `position`.
    pub fn with_position(self, position: Vec3) -> Self {
        match self {
            Constraint::Free { .. } => Constraint::Free { position },
            Constraint::NodeSnap { node, .. } => Constraint::NodeSnap { position, node },
            Constraint::MirrorSnap { plane_normal, .. } => Constraint::MirrorSnap {
                position,
                plane_normal,
            },
            Constraint::SurfaceEntry { patch, .. } => Constraint::SurfaceEntry { patch, position },
            Constraint::SurfaceExit { patch, .. } => Constraint::SurfaceExit { patch, position },
        }
    }

    /// Rank used when two constraints compete for the same spot.
    ///
    /// Node snaps win over mirror snaps, which win over surface markers,
    /// which win over free points.
    pub fn specificity(&self) -> u8 {
        match self {
            Constraint::Free { .. } => 0,
            Constraint::SurfaceEntry { .. } | Constraint::SurfaceExit { .. } => 1,
            Constraint::MirrorSnap { .. } => 2,
            Constraint::NodeSnap { .. } => 3,
        }
    }

    /// Curve/curve or curve/mirror intersection, relevant for hook trimming.
    pub fn is_intersection(&self) -> bool {
        matches!(
            self,
            Constraint::NodeSnap { .. } | Constraint::MirrorSnap { .. }
        )
    }

    pub fn node(&self) -> Option<NodeId> {
        match *self {
            Constraint::NodeSnap { node, .. } => Some(node),
            _ => None,
        }
    }

    pub fn patch(&self) -> Option<PatchId> {
        match *self {
            Constraint::SurfaceEntry { patch, .. } | Constraint::SurfaceExit { patch, .. } => {
                Some(patch)
            }
            _ => None,
        }
    }
}

/// Ordered constraints of one stroke.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap constraints that already satisfy the spacing invariant.
    pub(crate) fn from_vec(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    /// Add a candidate constraint.
    ///
    /// If the candidate lies within `merge_threshold` of the last constraint
    /// it replaces it only when strictly more specific; otherwise nothing
    /// changes. Returns `true` if the set changed.
    pub fn add_constraint(&mut self, candidate: Constraint, merge_threshold: f32) -> bool {
        let Some(last) = self.constraints.last_mut() else {
            self.constraints.push(candidate);
            return true;
        };

        if last.position().distance(candidate.position()) >= merge_threshold {
            self.constraints.push(candidate);
            return true;
        }

        if candidate.specificity() > last.specificity() {
            trace!(
                "ConstraintSet::add_constraint: {:?} replaces {:?}",
                candidate, last
            );
            *last = candidate;
            self.collapse_tail(merge_threshold);
            true
        } else {
            trace!("ConstraintSet::add_constraint: merged away {:?}", candidate);
            false
        }
    }

    // A replacement may land within the threshold of the constraint before it.
    fn collapse_tail(&mut self, merge_threshold: f32) {
        while let [.., before, last] = self.constraints.as_slice() {
            if before.position().distance(last.position()) >= merge_threshold {
                break;
            }
            let keep_last = last.specificity() > before.specificity();
            let len = self.constraints.len();
            if keep_last {
                self.constraints.remove(len - 2);
            } else {
                self.constraints.pop();
            }
        }
    }

    /// Record that the pen entered `patch` at `position`.
    pub fn enter_surface(&mut self, patch: PatchId, position: Vec3, merge_threshold: f32) -> bool {
        self.add_constraint(Constraint::SurfaceEntry { patch, position }, merge_threshold)
    }

    /// Record that the pen left `patch` at `position`.
    ///
    /// Leaving right where the patch was entered cancels the entry instead.
    pub fn exit_surface(&mut self, patch: PatchId, position: Vec3, merge_threshold: f32) -> bool {
        if let Some(Constraint::SurfaceEntry {
            patch: entered,
            position: entry,
        }) = self.constraints.last().copied()
        {
            if entered == patch && entry.distance(position) < merge_threshold {
                self.constraints.pop();
                return false;
            }
        }
        self.add_constraint(Constraint::SurfaceExit { patch, position }, merge_threshold)
    }

    pub fn as_slice(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn last(&self) -> Option<&Constraint> {
        self.constraints.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }
}
