//! Node/segment graph of the committed curve network.
//!
//! The graph is the single owner of nodes. Segments reference their
//! endpoints by id and belong to the stroke that produced them; deleting a
//! stroke deletes its segments and every node left without segments.
//!
//! Cycle detection over the graph lives in the submodules:
//! - `faces` traces the faces of a locally embedded graph
//! - `polygon` holds the planar polygon predicates used to validate loops
//! - `cycles` keeps the known cycle set and diffs it between updates

mod cycles;
mod faces;
pub(crate) mod polygon;

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::constants::EPS;
use crate::constraint::Constraint;
use crate::curve::Curve;
use crate::spatial::ProximityIndex;
use crate::types::{NodeId, SegmentId, StrokeId};

pub use cycles::{Cycle, CycleDetector, CycleKey, CycleUpdate};

/// Widening steps of `closest_node` before it falls back to a full scan.
const CLOSEST_NODE_ROUNDS: usize = 8;

/// A shared constraint point of the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub position: Vec3,
    /// Zero when undefined
    pub normal: Vec3,
}

/// The part of a stroke's curve between two consecutive anchors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphSegment {
    pub id: SegmentId,
    pub endpoints: (NodeId, NodeId),
    pub stroke: StrokeId,
    /// Arc length along the stroke's curve
    pub length: f32,
    /// Unit direction leaving `endpoints.0` along the curve
    pub start_tangent: Vec3,
    /// Unit direction leaving `endpoints.1` along the curve
    pub end_tangent: Vec3,
}

impl GraphSegment {
    /// The endpoint opposite `node`.
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        match self.endpoints {
            (a, b) if a == node => Some(b),
            (a, b) if b == node => Some(a),
            _ => None,
        }
    }

    /// Unit direction leaving `node` along this segment.
    pub fn tangent_from(&self, node: NodeId) -> Option<Vec3> {
        if self.endpoints.0 == node {
            Some(self.start_tangent)
        } else if self.endpoints.1 == node {
            Some(self.end_tangent)
        } else {
            None
        }
    }
}

/// The curve network.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: BTreeMap<NodeId, GraphNode>,
    segments: BTreeMap<SegmentId, GraphSegment>,
    adjacency: HashMap<NodeId, Vec<SegmentId>>,
    by_stroke: HashMap<StrokeId, Vec<SegmentId>>,
    index: ProximityIndex<NodeId>,
    next_node: u32,
    next_segment: u32,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_CELL_SIZE)
    }
}

impl Graph {
    pub fn new(cell_size: f32) -> Self {
        Self {
            nodes: BTreeMap::new(),
            segments: BTreeMap::new(),
            adjacency: HashMap::new(),
            by_stroke: HashMap::new(),
            index: ProximityIndex::new(cell_size),
            next_node: 0,
            next_segment: 0,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&GraphSegment> {
        self.segments.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Segments in id order.
    pub fn segments(&self) -> impl Iterator<Item = &GraphSegment> {
        self.segments.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments touching `node`, in insertion order.
    pub fn incident(&self, node: NodeId) -> &[SegmentId] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.incident(node).len()
    }

    /// Segments owned by `stroke`, in curve order.
    pub fn stroke_segments(&self, stroke: StrokeId) -> &[SegmentId] {
        self.by_stroke.get(&stroke).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes within `radius` of `position`, nearest first.
    pub fn nodes_within(&self, position: Vec3, radius: f32) -> Vec<NodeId> {
        self.index.query(position, radius)
    }

    /// Nearest node within `radius`.
    pub fn nearest_node(&self, position: Vec3, radius: f32) -> Option<NodeId> {
        self.index.nearest(position, radius).map(|(id, _)| id)
    }

    /// Nearest node regardless of distance.
    ///
    /// Searches the index in widening radii before scanning every node.
    pub fn closest_node(&self, position: Vec3) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut radius = self.index.cell_size();
        for _ in 0..CLOSEST_NODE_ROUNDS {
            if let Some((id, _)) = self.index.nearest(position, radius) {
                return Some(id);
            }
            radius *= 4.0;
        }
        self.nodes
            .values()
            .min_by(|a, b| {
                a.position
                    .distance_squared(position)
                    .total_cmp(&b.position.distance_squared(position))
            })
            .map(|n| n.id)
    }

    /// Rebucket the node index for a new snapping radius.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.index.set_cell_size(cell_size);
    }

    /// Add one segment per consecutive anchor pair of `curve`.
    ///
    /// Anchors resolve to nodes as follows:
    /// - `NodeSnap` reuses its node while that node is alive
    /// - `MirrorSnap` welds onto a node within `weld_threshold`, so a stroke
    ///   and its mirror meet on the plane
    /// - anything else welds onto a node within `EPS` or creates one
    ///
    /// Consecutive anchors resolving to the same node produce no segment.
    /// Returns the node of every anchor, or nothing when the curve has fewer
    /// than two anchors.
    pub fn add_stroke_segments(
        &mut self,
        stroke: StrokeId,
        curve: &Curve,
        weld_threshold: f32,
    ) -> Vec<NodeId> {
        let anchors = curve.anchors();
        if anchors.len() < 2 {
            return Vec::new();
        }

        let resolved: Vec<NodeId> = anchors
            .iter()
            .map(|a| self.resolve_node(&a.constraint, weld_threshold))
            .collect();

        let mut added = 0;
        for (pair, nodes) in anchors.windows(2).zip(resolved.windows(2)) {
            if nodes[0] == nodes[1] {
                continue;
            }
            let t0 = curve.parameter_at_vertex(pair[0].vertex);
            let t1 = curve.parameter_at_vertex(pair[1].vertex);
            let segment = GraphSegment {
                id: SegmentId(self.next_segment),
                endpoints: (nodes[0], nodes[1]),
                stroke,
                length: curve.length_between(t0, t1),
                start_tangent: curve.direction_at_vertex(pair[0].vertex, true),
                end_tangent: curve.direction_at_vertex(pair[1].vertex, false),
            };
            self.next_segment += 1;
            self.insert_segment(segment);
            added += 1;
        }

        self.remove_orphans(&resolved);
        debug!(
            "Graph::add_stroke_segments: stroke {} -> {} segments, {} nodes total",
            stroke,
            added,
            self.nodes.len()
        );
        resolved
    }

    /// Remove every segment of `stroke` and the nodes this leaves orphaned.
    ///
    /// Returns the number of segments removed.
    pub fn remove_stroke_segments(&mut self, stroke: StrokeId) -> usize {
        let touched = self.detach_stroke(stroke);
        let removed = touched.len() / 2;
        self.remove_orphans(&touched);
        debug!(
            "Graph::remove_stroke_segments: stroke {} lost {} segments",
            stroke, removed
        );
        removed
    }

    /// Replace the segments of `stroke` after its curve changed.
    ///
    /// Nodes shared with the old segments keep their ids.
    pub fn rebuild_stroke_segments(
        &mut self,
        stroke: StrokeId,
        curve: &Curve,
        weld_threshold: f32,
    ) -> Vec<NodeId> {
        let touched = self.detach_stroke(stroke);
        let resolved = self.add_stroke_segments(stroke, curve, weld_threshold);
        self.remove_orphans(&touched);
        resolved
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.segments.clear();
        self.adjacency.clear();
        self.by_stroke.clear();
        self.index.clear();
    }

    fn resolve_node(&mut self, constraint: &Constraint, weld_threshold: f32) -> NodeId {
        match *constraint {
            Constraint::NodeSnap { node, .. } if self.nodes.contains_key(&node) => node,
            Constraint::MirrorSnap {
                position,
                plane_normal,
            } => self
                .nearest_node(position, weld_threshold.max(EPS))
                .unwrap_or_else(|| self.create_node(position, plane_normal)),
            other => {
                let position = other.position();
                self.nearest_node(position, EPS)
                    .unwrap_or_else(|| self.create_node(position, Vec3::ZERO))
            }
        }
    }

    fn create_node(&mut self, position: Vec3, normal: Vec3) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            id,
            GraphNode {
                id,
                position,
                normal,
            },
        );
        self.index.insert(id, position);
        trace!("Graph::create_node: {} at {:?}", id, position);
        id
    }

    fn insert_segment(&mut self, segment: GraphSegment) {
        let (a, b) = segment.endpoints;
        self.adjacency.entry(a).or_default().push(segment.id);
        self.adjacency.entry(b).or_default().push(segment.id);
        self.by_stroke
            .entry(segment.stroke)
            .or_default()
            .push(segment.id);
        self.segments.insert(segment.id, segment);
    }

    /// Remove the stroke's segments, returning their endpoints.
    fn detach_stroke(&mut self, stroke: StrokeId) -> Vec<NodeId> {
        let mut touched = Vec::new();
        for id in self.by_stroke.remove(&stroke).unwrap_or_default() {
            let Some(segment) = self.segments.remove(&id) else {
                continue;
            };
            let (a, b) = segment.endpoints;
            for node in [a, b] {
                if let Some(list) = self.adjacency.get_mut(&node) {
                    list.retain(|s| *s != id);
                }
                touched.push(node);
            }
        }
        touched
    }

    fn remove_orphans(&mut self, candidates: &[NodeId]) {
        for &node in candidates {
            if self.degree(node) == 0 && self.nodes.remove(&node).is_some() {
                self.adjacency.remove(&node);
                self.index.remove(node);
                trace!("Graph::remove_orphans: {}", node);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::curve::Anchor;

    /// Straight curve through `points` with every point anchored.
    pub fn polyline(points: &[Vec3]) -> Curve {
        let anchors = points
            .iter()
            .enumerate()
            .map(|(vertex, p)| Anchor {
                constraint: Constraint::free(*p),
                vertex,
            })
            .collect();
        Curve::new(points.to_vec(), anchors)
    }

    /// Add a straight stroke between consecutive `points`.
    pub fn add_path(graph: &mut Graph, stroke: u32, points: &[Vec3]) -> Vec<NodeId> {
        graph.add_stroke_segments(StrokeId(stroke), &polyline(points), 1e-3)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::curve::Anchor;

    #[test]
    fn test_open_stroke_adds_two_nodes_one_segment() {
        let mut graph = Graph::default();
        let nodes = add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        assert_eq!(nodes.len(), 2);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.segment_count(), 1);
        let segment = graph.segments().next().unwrap();
        assert!((segment.length - 1.0).abs() < 1e-6);
        assert!(segment.start_tangent.abs_diff_eq(Vec3::X, 1e-6));
        assert!(segment.end_tangent.abs_diff_eq(-Vec3::X, 1e-6));
    }

    #[test]
    fn test_closest_node_near_and_far() {
        let mut graph = Graph::new(0.05);
        assert!(graph.closest_node(Vec3::ZERO).is_none());
        let nodes = add_path(&mut graph, 0, &[Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.4, 0.0, 0.0)]);
        let far = add_path(&mut graph, 1, &[Vec3::splat(5000.0), Vec3::splat(5001.0)]);

        assert_eq!(graph.closest_node(Vec3::new(0.12, 0.01, 0.0)), Some(nodes[0]));
        assert_eq!(graph.closest_node(Vec3::new(0.3, 0.0, 0.0)), Some(nodes[1]));
        // Beyond every widened radius
        assert_eq!(graph.closest_node(Vec3::splat(6000.0)), Some(far[1]));
    }

    #[test]
    fn test_single_anchor_adds_nothing() {
        let mut graph = Graph::default();
        assert!(add_path(&mut graph, 0, &[Vec3::ZERO]).is_empty());
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_free_anchors_weld_at_same_position() {
        let mut graph = Graph::default();
        let a = add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        let b = add_path(&mut graph, 1, &[Vec3::X, Vec3::Y]);
        assert_eq!(a[1], b[0]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.degree(a[1]), 2);
    }

    #[test]
    fn test_node_snap_reuses_node() {
        let mut graph = Graph::default();
        let a = add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        let points = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::Y];
        let anchors = vec![
            Anchor {
                constraint: Constraint::NodeSnap {
                    position: Vec3::X,
                    node: a[1],
                },
                vertex: 0,
            },
            Anchor {
                constraint: Constraint::free(Vec3::Y),
                vertex: 1,
            },
        ];
        let b = graph.add_stroke_segments(StrokeId(1), &Curve::new(points, anchors), 1e-3);
        assert_eq!(b[0], a[1]);
    }

    #[test]
    fn test_mirror_snaps_weld_within_threshold() {
        let mut graph = Graph::default();
        let on_plane = |x: f32| Anchor {
            constraint: Constraint::MirrorSnap {
                position: Vec3::new(x, 0.0, 0.0),
                plane_normal: Vec3::Z,
            },
            vertex: 0,
        };
        let far = |p: Vec3| Anchor {
            constraint: Constraint::free(p),
            vertex: 1,
        };
        let left = Curve::new(
            vec![Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)],
            vec![on_plane(0.0), far(Vec3::new(0.0, 0.0, 1.0))],
        );
        let right = Curve::new(
            vec![Vec3::new(0.0005, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0)],
            vec![on_plane(0.0005), far(Vec3::new(0.0, 0.0, -1.0))],
        );
        let a = graph.add_stroke_segments(StrokeId(0), &left, 1e-3);
        let b = graph.add_stroke_segments(StrokeId(1), &right, 1e-3);
        assert_eq!(a[0], b[0]);
        assert_eq!(graph.node(a[0]).unwrap().normal, Vec3::Z);
    }

    #[test]
    fn test_remove_stroke_removes_only_its_segments() {
        let mut graph = Graph::default();
        let a = add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        let b = add_path(&mut graph, 1, &[Vec3::X, Vec3::Y]);
        let c = add_path(&mut graph, 2, &[Vec3::Y, Vec3::ZERO]);

        assert_eq!(graph.remove_stroke_segments(StrokeId(1)), 1);
        assert_eq!(graph.segment_count(), 2);
        // Every node still has a segment from strokes 0 or 2
        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains_node(b[0]) && graph.contains_node(b[1]));
        assert!(graph.stroke_segments(StrokeId(1)).is_empty());

        assert_eq!(graph.remove_stroke_segments(StrokeId(0)), 1);
        assert!(!graph.contains_node(a[1]));
        assert!(graph.contains_node(c[0]) && graph.contains_node(c[1]));
        assert!(graph.nearest_node(Vec3::X, 0.1).is_none());
    }

    #[test]
    fn test_rebuild_keeps_node_ids() {
        let mut graph = Graph::default();
        let before = add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        let split = polyline(&[Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), Vec3::X]);
        let after = graph.rebuild_stroke_segments(StrokeId(0), &split, 1e-3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[1]);
        assert_eq!(graph.segment_count(), 2);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_closed_stroke_shares_endpoint() {
        let mut graph = Graph::default();
        let nodes = add_path(
            &mut graph,
            0,
            &[Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ZERO],
        );
        assert_eq!(nodes[0], nodes[3]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.segment_count(), 3);
    }
}
