//! Face tracing over a locally embedded curve network.
//!
//! The network is not planar in general, so there is no global embedding.
//! Instead every node gets a local normal estimated from the directions of
//! its segments, oriented consistently across each connected component.
//! Sorting segments counter-clockwise around that normal gives a rotation
//! system; walking "turn to the next segment clockwise from where we came
//! from" traces faces with the face on the left. Bounded faces come out
//! counter-clockwise about the node normals and the outer face clockwise,
//! which is how the caller tells them apart.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use glam::Vec3;

use super::{Graph, GraphSegment};
use crate::constants::EPS;
use crate::types::{NodeId, SegmentId};

/// A closed walk traced around one face.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedFace {
    pub nodes: Vec<NodeId>,
    pub segments: Vec<SegmentId>,
}

/// Outgoing half-edge at a node.
#[derive(Debug, Clone, Copy)]
struct HalfEdge {
    segment: SegmentId,
    to: NodeId,
    direction: Vec3,
}

/// Local embedding of the allowed part of the graph.
pub struct Embedding {
    /// Counter-clockwise ordered half-edges per node
    rotation: BTreeMap<NodeId, Vec<HalfEdge>>,
    normals: HashMap<NodeId, Vec3>,
}

impl Embedding {
    /// Build the embedding of the 2-core of the segments accepted by `allowed`.
    pub fn new(graph: &Graph, allowed: impl Fn(&GraphSegment) -> bool) -> Self {
        let mut rotation: BTreeMap<NodeId, Vec<HalfEdge>> = BTreeMap::new();
        for segment in graph.segments().filter(|s| allowed(s)) {
            let (a, b) = segment.endpoints;
            rotation.entry(a).or_default().push(HalfEdge {
                segment: segment.id,
                to: b,
                direction: segment.start_tangent,
            });
            rotation.entry(b).or_default().push(HalfEdge {
                segment: segment.id,
                to: a,
                direction: segment.end_tangent,
            });
        }

        prune_to_core(&mut rotation);
        let normals = orient_normals(&rotation);

        for (node, edges) in rotation.iter_mut() {
            let normal = normals.get(node).copied().unwrap_or(Vec3::Z);
            sort_around(edges, normal);
        }

        Self { rotation, normals }
    }

    /// Oriented normal estimate at `node`, zero if the node is not embedded.
    pub fn normal(&self, node: NodeId) -> Vec3 {
        self.normals.get(&node).copied().unwrap_or(Vec3::ZERO)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.rotation.contains_key(&node)
    }

    /// Trace every face of the embedding.
    ///
    /// Faces that revisit a node are dropped.
    pub fn faces(&self) -> Vec<TracedFace> {
        let mut visited: HashSet<(SegmentId, NodeId)> = HashSet::new();
        let mut faces = Vec::new();
        let max_steps: usize = self.rotation.values().map(Vec::len).sum::<usize>() + 1;

        for (&start, edges) in &self.rotation {
            for edge in edges {
                if visited.contains(&(edge.segment, start)) {
                    continue;
                }
                if let Some(face) = self.trace(start, *edge, &mut visited, max_steps) {
                    faces.push(face);
                }
            }
        }
        faces
    }

    /// Faces passing through `node`.
    pub fn faces_through(&self, node: NodeId) -> Vec<TracedFace> {
        self.faces()
            .into_iter()
            .filter(|f| f.nodes.contains(&node))
            .collect()
    }

    fn trace(
        &self,
        start: NodeId,
        first: HalfEdge,
        visited: &mut HashSet<(SegmentId, NodeId)>,
        max_steps: usize,
    ) -> Option<TracedFace> {
        let mut nodes = Vec::new();
        let mut segments = Vec::new();
        let mut from = start;
        let mut edge = first;

        for _ in 0..max_steps {
            visited.insert((edge.segment, from));
            nodes.push(from);
            segments.push(edge.segment);

            let next = self.next_edge(edge.to, edge.segment)?;
            from = edge.to;
            edge = next;

            if from == start && edge.segment == first.segment {
                let unique: BTreeSet<NodeId> = nodes.iter().copied().collect();
                if unique.len() != nodes.len() {
                    return None;
                }
                return Some(TracedFace { nodes, segments });
            }
        }
        None
    }

    /// Half-edge leaving `node` clockwise-next from the one we arrived on.
    fn next_edge(&self, node: NodeId, arrived_on: SegmentId) -> Option<HalfEdge> {
        let edges = self.rotation.get(&node)?;
        let k = edges.iter().position(|e| e.segment == arrived_on)?;
        let deg = edges.len();
        Some(edges[(k + deg - 1) % deg])
    }
}

/// Repeatedly drop nodes with fewer than two half-edges.
fn prune_to_core(rotation: &mut BTreeMap<NodeId, Vec<HalfEdge>>) {
    let mut queue: VecDeque<NodeId> = rotation
        .iter()
        .filter(|(_, e)| e.len() < 2)
        .map(|(n, _)| *n)
        .collect();

    while let Some(node) = queue.pop_front() {
        let Some(edges) = rotation.remove(&node) else {
            continue;
        };
        for edge in edges {
            if let Some(other) = rotation.get_mut(&edge.to) {
                other.retain(|e| e.segment != edge.segment);
                if other.len() < 2 {
                    queue.push_back(edge.to);
                }
            }
        }
    }
}

/// Unoriented normal of the plane best fitting the segment directions.
fn estimate_normal(edges: &[HalfEdge]) -> Vec3 {
    match edges {
        [] | [_] => Vec3::ZERO,
        [a, b] => a.direction.cross(b.direction).normalize_or_zero(),
        _ => {
            let tips: Vec<Vec3> = edges.iter().map(|e| e.direction).collect();
            let center = tips.iter().copied().sum::<Vec3>() / tips.len() as f32;

            // Initial guess from pairwise crosses, flipped to agree
            let mut guess = Vec3::ZERO;
            for i in 0..tips.len() {
                for j in i + 1..tips.len() {
                    let c = tips[i].cross(tips[j]);
                    guess += if c.dot(guess) < 0.0 { -c } else { c };
                }
            }

            // Smallest principal axis of the tips via power iteration on trace*I - C
            let mut cov = glam::Mat3::ZERO;
            for t in &tips {
                let d = *t - center;
                cov += glam::Mat3::from_cols(d * d.x, d * d.y, d * d.z);
            }
            let trace = cov.x_axis.x + cov.y_axis.y + cov.z_axis.z;
            if trace <= EPS {
                return guess.normalize_or_zero();
            }
            let shifted = glam::Mat3::from_diagonal(Vec3::splat(trace)) - cov;
            let mut v = guess.normalize_or(Vec3::new(0.267, 0.535, 0.802));
            for _ in 0..32 {
                let next = shifted * v;
                if next.length_squared() <= EPS * EPS {
                    break;
                }
                v = next.normalize();
            }
            v
        }
    }
}

/// Per-node normals, oriented consistently by breadth-first propagation.
fn orient_normals(rotation: &BTreeMap<NodeId, Vec<HalfEdge>>) -> HashMap<NodeId, Vec3> {
    let mut normals: HashMap<NodeId, Vec3> = rotation
        .iter()
        .map(|(n, e)| (*n, estimate_normal(e)))
        .collect();
    let mut seen: HashSet<NodeId> = HashSet::new();

    for &root in rotation.keys() {
        if !seen.insert(root) {
            continue;
        }
        if normals[&root].length_squared() <= EPS {
            // Borrow the first usable normal of the component
            let fallback = component_normal(rotation, &normals, root);
            normals.insert(root, fallback);
        }

        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            let parent = normals[&node];
            for edge in &rotation[&node] {
                if !seen.insert(edge.to) {
                    continue;
                }
                let own = normals[&edge.to];
                let oriented = if own.length_squared() <= EPS {
                    parent
                } else if own.dot(parent) < 0.0 {
                    -own
                } else {
                    own
                };
                normals.insert(edge.to, oriented);
                queue.push_back(edge.to);
            }
        }
    }
    normals
}

fn component_normal(
    rotation: &BTreeMap<NodeId, Vec<HalfEdge>>,
    normals: &HashMap<NodeId, Vec3>,
    root: NodeId,
) -> Vec3 {
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        let n = normals[&node];
        if n.length_squared() > EPS {
            return n;
        }
        for edge in &rotation[&node] {
            if seen.insert(edge.to) {
                queue.push_back(edge.to);
            }
        }
    }
    Vec3::Z
}

/// Sort half-edges counter-clockwise around `normal`.
fn sort_around(edges: &mut [HalfEdge], normal: Vec3) {
    let n = normal.normalize_or(Vec3::Z);
    let reference = edges
        .iter()
        .map(|e| e.direction - n * e.direction.dot(n))
        .find(|p| p.length_squared() > EPS * EPS)
        .map(Vec3::normalize)
        .unwrap_or_else(|| n.any_orthonormal_vector());
    let side = n.cross(reference);

    let angle = |e: &HalfEdge| e.direction.dot(side).atan2(e.direction.dot(reference));
    edges.sort_by(|a, b| angle(a).total_cmp(&angle(b)).then(a.segment.cmp(&b.segment)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::polygon::newell_normal;
    use crate::graph::test_support::add_path;

    fn positions(graph: &Graph, face: &TracedFace) -> Vec<Vec3> {
        face.nodes
            .iter()
            .map(|n| graph.node(*n).unwrap().position)
            .collect()
    }

    fn bounded_faces(graph: &Graph) -> Vec<TracedFace> {
        let embedding = Embedding::new(graph, |_| true);
        embedding
            .faces()
            .into_iter()
            .filter(|f| {
                let area = newell_normal(&positions(graph, f));
                let mean: Vec3 = f.nodes.iter().map(|n| embedding.normal(*n)).sum();
                area.dot(mean) > 0.0
            })
            .collect()
    }

    #[test]
    fn test_triangle_has_one_bounded_face() {
        let mut graph = Graph::default();
        add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        add_path(&mut graph, 1, &[Vec3::X, Vec3::Y]);
        add_path(&mut graph, 2, &[Vec3::Y, Vec3::ZERO]);

        let embedding = Embedding::new(&graph, |_| true);
        assert_eq!(embedding.faces().len(), 2);
        let bounded = bounded_faces(&graph);
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].nodes.len(), 3);
    }

    #[test]
    fn test_dangling_segments_are_pruned() {
        let mut graph = Graph::default();
        add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ZERO]);
        add_path(&mut graph, 1, &[Vec3::X, Vec3::new(2.0, 0.0, 0.0)]);
        let embedding = Embedding::new(&graph, |_| true);
        let far = graph.nearest_node(Vec3::new(2.0, 0.0, 0.0), 0.1).unwrap();
        assert!(!embedding.contains(far));
        assert_eq!(bounded_faces(&graph).len(), 1);
    }

    #[test]
    fn test_two_squares_sharing_an_edge() {
        let mut graph = Graph::default();
        let p = |x: f32, y: f32| Vec3::new(x, y, 0.0);
        add_path(&mut graph, 0, &[p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0)]);
        add_path(&mut graph, 1, &[p(2.0, 0.0), p(2.0, 1.0), p(1.0, 1.0), p(0.0, 1.0)]);
        add_path(&mut graph, 2, &[p(0.0, 1.0), p(0.0, 0.0)]);
        add_path(&mut graph, 3, &[p(1.0, 0.0), p(1.0, 1.0)]);

        let bounded = bounded_faces(&graph);
        assert_eq!(bounded.len(), 2);
        assert!(bounded.iter().all(|f| f.nodes.len() == 4));
    }

    #[test]
    fn test_cube_has_six_faces() {
        let mut graph = Graph::default();
        let corner = |i: u32| {
            Vec3::new(
                (i & 1) as f32,
                ((i >> 1) & 1) as f32,
                ((i >> 2) & 1) as f32,
            )
        };
        let mut stroke = 0;
        for a in 0..8u32 {
            for bit in [1u32, 2, 4] {
                let b = a | bit;
                if b != a {
                    add_path(&mut graph, stroke, &[corner(a), corner(b)]);
                    stroke += 1;
                }
            }
        }
        assert_eq!(graph.segment_count(), 12);

        let bounded = bounded_faces(&graph);
        assert_eq!(bounded.len(), 6);
        assert!(bounded.iter().all(|f| f.nodes.len() == 4));
    }

    #[test]
    fn test_allowed_filter_removes_faces() {
        let mut graph = Graph::default();
        add_path(&mut graph, 0, &[Vec3::ZERO, Vec3::X]);
        add_path(&mut graph, 1, &[Vec3::X, Vec3::Y]);
        add_path(&mut graph, 2, &[Vec3::Y, Vec3::ZERO]);
        let embedding = Embedding::new(&graph, |s| s.stroke.0 != 1);
        assert!(embedding.faces().is_empty());
    }
}
