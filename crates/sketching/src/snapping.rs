//! Turning pen proximity into constraint candidates.
//!
//! Hosts with their own collision detection report [`CollisionTarget`]s and
//! get a constraint back from [`classify`]. The session also probes the
//! network itself with [`probe`], in priority order:
//!
//! 1. an existing node within the node snapping radius
//! 2. a grid point within the proximity radius, upgraded to a node or
//!    mirror snap when one of those sits on the grid point
//! 3. the mirror plane within the proximity radius
//! 4. a committed stroke within the proximity radius (free point on it)

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::graph::Graph;
use crate::grid::Grid3D;
use crate::mirror::MirrorPlane;
use crate::strokes::StrokeStore;
use crate::types::{NodeId, StrokeId};

/// Something the pen collided with, in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionTarget {
    ExistingNode { node: NodeId, position: Vec3 },
    StrokeSurface { stroke: StrokeId, position: Vec3 },
    MirrorPlane { position: Vec3, normal: Vec3 },
    GridPoint { position: Vec3 },
}

impl CollisionTarget {
    /// Priority when several targets overlap: nodes first, then committed
    /// strokes, then the mirror plane, then grid points.
    pub fn priority(&self) -> u8 {
        match self {
            CollisionTarget::ExistingNode { .. } => 3,
            CollisionTarget::StrokeSurface { .. } => 2,
            CollisionTarget::MirrorPlane { .. } => 1,
            CollisionTarget::GridPoint { .. } => 0,
        }
    }

    pub fn to_constraint(&self) -> Constraint {
        match *self {
            CollisionTarget::ExistingNode { node, position } => {
                Constraint::NodeSnap { position, node }
            }
            CollisionTarget::StrokeSurface { position, .. }
            | CollisionTarget::GridPoint { position } => Constraint::Free { position },
            CollisionTarget::MirrorPlane { position, normal } => Constraint::MirrorSnap {
                position,
                plane_normal: normal,
            },
        }
    }
}

/// Constraint for the highest-priority target; the first one wins ties.
pub fn classify(hits: &[CollisionTarget]) -> Option<Constraint> {
    hits.iter()
        .fold(None::<&CollisionTarget>, |best, hit| match best {
            Some(b) if b.priority() >= hit.priority() => Some(b),
            _ => Some(hit),
        })
        .map(CollisionTarget::to_constraint)
}

/// Everything a probe looks at.
pub struct ProbeContext<'a, M: MirrorPlane + ?Sized, G: Grid3D + ?Sized> {
    pub graph: &'a Graph,
    pub strokes: &'a StrokeStore,
    pub mirror: Option<&'a M>,
    pub grid: &'a G,
    pub snap_to_node: f32,
    pub proximity: f32,
    /// Longest curve segment, pads stroke lookups
    pub max_curve_segment: f32,
}

/// Best constraint candidate around `position`, if any.
pub fn probe<M: MirrorPlane + ?Sized, G: Grid3D + ?Sized>(
    position: Vec3,
    ctx: &ProbeContext<'_, M, G>,
) -> Option<Constraint> {
    if let Some(node) = ctx.graph.nearest_node(position, ctx.snap_to_node) {
        let position = ctx.graph.node(node)?.position;
        return Some(Constraint::NodeSnap { position, node });
    }

    if let Some(grid_point) = ctx.grid.try_find_constraint(position, ctx.proximity) {
        return classify(&targets_at(grid_point, ctx));
    }

    if let Some(mirror) = ctx.mirror {
        if mirror.signed_distance(position).abs() <= ctx.proximity {
            return Some(Constraint::MirrorSnap {
                position: mirror.project(position),
                plane_normal: mirror.normal(),
            });
        }
    }

    ctx.strokes
        .closest_on_curves(position, ctx.proximity, ctx.max_curve_segment)
        .first()
        .map(|hit| Constraint::free(hit.position))
}

/// Targets overlapping a grid point.
fn targets_at<M: MirrorPlane + ?Sized, G: Grid3D + ?Sized>(
    grid_point: Vec3,
    ctx: &ProbeContext<'_, M, G>,
) -> Vec<CollisionTarget> {
    let mut hits = vec![CollisionTarget::GridPoint {
        position: grid_point,
    }];
    if let Some(node) = ctx.graph.nearest_node(grid_point, ctx.snap_to_node) {
        if let Some(n) = ctx.graph.node(node) {
            hits.push(CollisionTarget::ExistingNode {
                node,
                position: n.position,
            });
        }
    }
    if let Some(hit) = ctx
        .strokes
        .closest_on_curves(grid_point, ctx.proximity, ctx.max_curve_segment)
        .first()
    {
        hits.push(CollisionTarget::StrokeSurface {
            stroke: hit.stroke,
            position: grid_point,
        });
    }
    if let Some(mirror) = ctx.mirror {
        if mirror.signed_distance(grid_point).abs() <= ctx.proximity {
            hits.push(CollisionTarget::MirrorPlane {
                position: mirror.project(grid_point),
                normal: mirror.normal(),
            });
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::add_path;
    use crate::grid::LatticeGrid;
    use crate::mirror::SymmetryPlane;

    #[test]
    fn test_classify_total_order() {
        let grid = CollisionTarget::GridPoint {
            position: Vec3::ZERO,
        };
        let mirror = CollisionTarget::MirrorPlane {
            position: Vec3::ZERO,
            normal: Vec3::X,
        };
        let node = CollisionTarget::ExistingNode {
            node: NodeId(3),
            position: Vec3::ZERO,
        };
        assert_eq!(classify(&[]), None);
        assert_eq!(classify(&[grid]), Some(Constraint::free(Vec3::ZERO)));
        assert!(matches!(
            classify(&[grid, mirror]),
            Some(Constraint::MirrorSnap { .. })
        ));
        // Order of reports does not matter
        assert_eq!(
            classify(&[node, mirror, grid]),
            classify(&[grid, mirror, node])
        );
        assert_eq!(classify(&[mirror, node]).and_then(|c| c.node()), Some(NodeId(3)));
    }

    fn context<'a>(
        graph: &'a Graph,
        strokes: &'a StrokeStore,
        mirror: Option<&'a SymmetryPlane>,
        grid: &'a LatticeGrid,
    ) -> ProbeContext<'a, SymmetryPlane, LatticeGrid> {
        ProbeContext {
            graph,
            strokes,
            mirror,
            grid,
            snap_to_node: 0.03,
            proximity: 0.02,
            max_curve_segment: 0.02,
        }
    }

    #[test]
    fn test_probe_prefers_existing_node() {
        let mut graph = Graph::default();
        add_path(&mut graph, 0, &[Vec3::new(0.11, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5)]);
        let strokes = StrokeStore::new(0.05);
        let grid = LatticeGrid::default();
        let ctx = context(&graph, &strokes, None, &grid);

        let c = probe(Vec3::new(0.1, 0.0, 0.0), &ctx).unwrap();
        assert!(c.node().is_some());
        assert!(c.position().abs_diff_eq(Vec3::new(0.11, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_probe_grid_then_mirror_then_nothing() {
        let graph = Graph::default();
        let strokes = StrokeStore::new(0.05);
        let grid = LatticeGrid::default();
        let plane = SymmetryPlane::default();

        let ctx = context(&graph, &strokes, Some(&plane), &grid);
        // Grid point on the mirror plane becomes a mirror snap
        let c = probe(Vec3::new(0.005, 0.1, 0.0), &ctx).unwrap();
        assert!(matches!(c, Constraint::MirrorSnap { .. }));
        assert!(c.position().abs_diff_eq(Vec3::new(0.0, 0.1, 0.0), 1e-6));

        // Off the grid but on the plane
        let c = probe(Vec3::new(0.01, 0.05, 0.05), &ctx).unwrap();
        assert!(matches!(c, Constraint::MirrorSnap { .. }));
        assert!(c.position().abs_diff_eq(Vec3::new(0.0, 0.05, 0.05), 1e-6));

        // Grid point away from the plane stays free
        let c = probe(Vec3::new(0.2, 0.1, 0.0), &ctx).unwrap();
        assert_eq!(c, Constraint::free(Vec3::new(0.2, 0.1, 0.0)));

        // Nothing nearby
        assert!(probe(Vec3::new(0.25, 0.05, 0.05), &ctx).is_none());
    }
}
