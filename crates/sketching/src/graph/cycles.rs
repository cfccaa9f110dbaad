//! Cycle detection and diffing.
//!
//! The detector keeps three sets of cycles:
//! - `current`: the result of the last search
//! - `published`: what the last [`CycleDetector::update`] reported, with the
//!   patch ids handed out for it
//! - `manual`: cycles requested through [`CycleDetector::find_cycle_at`],
//!   kept as long as their segments exist
//!
//! Cycles deleted by the user are suppressed from automatic detection until
//! the segments bounding them change.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::faces::{Embedding, TracedFace};
use super::polygon::{contains_point, is_simple, newell_normal, plane_deviation, project};
use super::{Graph, GraphSegment};
use crate::constants::MIN_CYCLE_AREA;
use crate::types::{NodeId, PatchId, SegmentId};

/// Rotation- and direction-invariant identity of a cycle.
///
/// The node sequence is rotated so the smallest id comes first, then read
/// in whichever direction puts the smaller neighbor second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleKey(Vec<NodeId>);

impl CycleKey {
    pub fn new(nodes: &[NodeId]) -> Self {
        let Some(start) = nodes
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| **n)
            .map(|(i, _)| i)
        else {
            return Self(Vec::new());
        };
        let n = nodes.len();
        let forward: Vec<NodeId> = (0..n).map(|i| nodes[(start + i) % n]).collect();
        let backward: Vec<NodeId> = (0..n).map(|i| nodes[(start + n - i) % n]).collect();
        Self(forward.min(backward))
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }
}

/// A closed loop of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Node ids in walk order, without repeating the first
    pub nodes: Vec<NodeId>,
    /// `segments[i]` joins `nodes[i]` and `nodes[i + 1]` (cyclically)
    pub segments: Vec<SegmentId>,
    /// Node positions at detection time
    pub positions: Vec<Vec3>,
    /// Total arc length of the segments
    pub length: f32,
    pub patch: Option<PatchId>,
}

impl Cycle {
    pub fn key(&self) -> CycleKey {
        CycleKey::new(&self.nodes)
    }

    /// Nodes with the first repeated at the end.
    pub fn closed_nodes(&self) -> Vec<NodeId> {
        let mut closed = self.nodes.clone();
        if let Some(first) = self.nodes.first() {
            closed.push(*first);
        }
        closed
    }

    /// Polygon normal from the node positions (length is twice the area).
    pub fn area_vector(&self) -> Vec3 {
        newell_normal(&self.positions)
    }

    fn sorted_segments(&self) -> Vec<SegmentId> {
        let mut segments = self.segments.clone();
        segments.sort();
        segments
    }

    /// Whether every node and segment still exists as recorded.
    fn is_live(&self, graph: &Graph) -> bool {
        let n = self.nodes.len();
        self.segments.iter().enumerate().all(|(i, s)| {
            graph.segment(*s).is_some_and(|seg| {
                let (a, b) = (self.nodes[i], self.nodes[(i + 1) % n]);
                seg.endpoints == (a, b) || seg.endpoints == (b, a)
            })
        })
    }
}

/// Cycles gained and lost since the previous update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleUpdate {
    pub added: Vec<Cycle>,
    pub removed: Vec<Cycle>,
}

impl CycleUpdate {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Incremental cycle search over a [`Graph`].
#[derive(Debug, Clone)]
pub struct CycleDetector {
    automatic: bool,
    planarity_tolerance: f32,
    current: BTreeMap<CycleKey, Cycle>,
    published: BTreeMap<CycleKey, Cycle>,
    manual: BTreeMap<CycleKey, Cycle>,
    /// Deleted cycles and the segments they had when deleted
    suppressed: BTreeMap<CycleKey, Vec<SegmentId>>,
}

impl CycleDetector {
    pub fn new(automatic: bool, planarity_tolerance: f32) -> Self {
        Self {
            automatic,
            planarity_tolerance,
            current: BTreeMap::new(),
            published: BTreeMap::new(),
            manual: BTreeMap::new(),
            suppressed: BTreeMap::new(),
        }
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    /// Switch between automatic and manual-only detection.
    pub fn set_automatic(&mut self, automatic: bool) {
        self.automatic = automatic;
    }

    pub fn set_planarity_tolerance(&mut self, tolerance: f32) {
        self.planarity_tolerance = tolerance;
    }

    /// Cycles found by the last search.
    pub fn cycles(&self) -> impl Iterator<Item = &Cycle> {
        self.current.values()
    }

    /// Cycles reported by the last update, with their patch ids.
    pub fn published(&self) -> impl Iterator<Item = &Cycle> {
        self.published.values()
    }

    pub fn cycle_for_patch(&self, patch: PatchId) -> Option<&Cycle> {
        self.published.values().find(|c| c.patch == Some(patch))
    }

    /// Recompute the full cycle set.
    ///
    /// Manual cycles whose segments still exist are always kept. In automatic
    /// mode every bounded face of the network is added, except suppressed ones.
    pub fn try_find_all_cycles(&mut self, graph: &Graph) {
        self.manual.retain(|_, c| c.is_live(graph));
        self.suppressed
            .retain(|_, segments| segments.iter().all(|s| graph.segment(*s).is_some()));

        let mut found = self.manual.clone();
        if self.automatic {
            let embedding = Embedding::new(graph, |_| true);
            for face in embedding.faces() {
                if !is_positive(graph, &embedding, &face) {
                    continue;
                }
                let Some(cycle) = self.validate(graph, &face.nodes, &face.segments) else {
                    continue;
                };
                let key = cycle.key();
                if self.is_suppressed(&key, &cycle) {
                    continue;
                }
                found.entry(key).or_insert(cycle);
            }
        }

        debug!(
            "CycleDetector::try_find_all_cycles: {} cycles ({} manual)",
            found.len(),
            self.manual.len()
        );
        self.current = found;
    }

    /// Diff the current cycles against the previous update.
    ///
    /// Calling it again without a new search reports nothing.
    pub fn update(&mut self) -> CycleUpdate {
        let removed: Vec<Cycle> = self
            .published
            .iter()
            .filter(|(k, _)| !self.current.contains_key(*k))
            .map(|(_, c)| c.clone())
            .collect();
        let added: Vec<Cycle> = self
            .current
            .iter()
            .filter(|(k, _)| !self.published.contains_key(*k))
            .map(|(_, c)| c.clone())
            .collect();

        let mut next = self.current.clone();
        for (key, cycle) in next.iter_mut() {
            if let Some(previous) = self.published.get(key) {
                cycle.patch = previous.patch;
            }
        }
        self.current = next.clone();
        self.published = next;

        if !added.is_empty() || !removed.is_empty() {
            info!(
                "CycleDetector::update: +{} -{} cycles",
                added.len(),
                removed.len()
            );
        }
        CycleUpdate { added, removed }
    }

    /// Record the patch built for a published cycle.
    pub fn assign_patch(&mut self, key: &CycleKey, patch: PatchId) {
        for set in [&mut self.published, &mut self.current, &mut self.manual] {
            if let Some(cycle) = set.get_mut(key) {
                cycle.patch = Some(patch);
            }
        }
    }

    /// Forget the cycle bounding `patch` and keep it from coming back.
    ///
    /// Returns the removed cycle, `None` if no published cycle has that patch.
    pub fn delete_patch(&mut self, patch: PatchId) -> Option<Cycle> {
        let key = self
            .published
            .iter()
            .find(|(_, c)| c.patch == Some(patch))
            .map(|(k, _)| k.clone())?;
        let cycle = self.published.remove(&key)?;
        self.current.remove(&key);
        self.manual.remove(&key);
        self.suppressed.insert(key, cycle.sorted_segments());
        debug!("CycleDetector::delete_patch: suppressed cycle of {}", patch);
        Some(cycle)
    }

    /// Look for the smallest cycle around `position`.
    ///
    /// The search starts at the node closest to `position` and considers
    /// the faces through it plus the shortest loop closing each of its
    /// segments. Candidates must be valid cycles whose projection encloses
    /// `position`. Unless `allow_non_manifold` is set, segments already
    /// bounding a cycle are off limits.
    ///
    /// The shortest candidate wins; equal lengths fall back to the smallest
    /// key. Returns `true` if a new cycle was recorded.
    pub fn find_cycle_at(&mut self, graph: &Graph, position: Vec3, allow_non_manifold: bool) -> bool {
        let Some(start) = graph.closest_node(position) else {
            return false;
        };

        let used: HashSet<SegmentId> = if allow_non_manifold {
            HashSet::new()
        } else {
            self.current
                .values()
                .flat_map(|c| c.segments.iter().copied())
                .collect()
        };
        let allowed = |s: &GraphSegment| !used.contains(&s.id);

        let mut candidates: Vec<(Vec<NodeId>, Vec<SegmentId>)> = Embedding::new(graph, allowed)
            .faces_through(start)
            .into_iter()
            .map(|f: TracedFace| (f.nodes, f.segments))
            .collect();
        for &segment in graph.incident(start) {
            if used.contains(&segment) {
                continue;
            }
            if let Some(walk) = shortest_loop(graph, start, segment, &used) {
                candidates.push(walk);
            }
        }

        let best = candidates
            .into_iter()
            .filter_map(|(nodes, segments)| self.validate(graph, &nodes, &segments))
            .filter(|c| encloses(c, position))
            .min_by(|a, b| {
                a.length
                    .total_cmp(&b.length)
                    .then_with(|| a.key().cmp(&b.key()))
            });

        let Some(cycle) = best else {
            debug!(
                "CycleDetector::find_cycle_at: nothing around {:?} (non-manifold: {})",
                position, allow_non_manifold
            );
            return false;
        };

        let key = cycle.key();
        if self.current.contains_key(&key) {
            debug!("CycleDetector::find_cycle_at: cycle already known");
            return false;
        }
        self.suppressed.remove(&key);
        self.manual.insert(key.clone(), cycle.clone());
        self.current.insert(key, cycle);
        true
    }

    /// Drop every cycle, returning the published ones.
    pub fn clear(&mut self) -> Vec<Cycle> {
        self.current.clear();
        self.manual.clear();
        self.suppressed.clear();
        std::mem::take(&mut self.published).into_values().collect()
    }

    fn is_suppressed(&self, key: &CycleKey, cycle: &Cycle) -> bool {
        self.suppressed
            .get(key)
            .is_some_and(|segments| *segments == cycle.sorted_segments())
    }

    /// Turn a closed walk into a cycle if it is a valid patch boundary.
    ///
    /// Valid means at least three distinct nodes, non-degenerate area,
    /// nodes within the planarity tolerance (relative to the perimeter) of
    /// their best-fit plane, and no self-intersection in that plane.
    fn validate(&self, graph: &Graph, nodes: &[NodeId], segments: &[SegmentId]) -> Option<Cycle> {
        if nodes.len() < 3 || nodes.len() != segments.len() {
            return None;
        }
        let distinct: HashSet<NodeId> = nodes.iter().copied().collect();
        if distinct.len() != nodes.len() {
            return None;
        }

        let positions: Vec<Vec3> = nodes
            .iter()
            .map(|n| graph.node(*n).map(|node| node.position))
            .collect::<Option<_>>()?;
        let length: f32 = segments
            .iter()
            .map(|s| graph.segment(*s).map(|seg| seg.length))
            .sum::<Option<f32>>()?;

        let area = newell_normal(&positions);
        if area.length() <= MIN_CYCLE_AREA {
            return None;
        }
        if plane_deviation(&positions, area) > self.planarity_tolerance * length {
            return None;
        }
        if !is_simple(&project(&positions, area)) {
            return None;
        }

        Some(Cycle {
            nodes: nodes.to_vec(),
            segments: segments.to_vec(),
            positions,
            length,
            patch: None,
        })
    }
}

/// Whether a traced face runs counter-clockwise about its node normals.
fn is_positive(graph: &Graph, embedding: &Embedding, face: &TracedFace) -> bool {
    let positions: Option<Vec<Vec3>> = face
        .nodes
        .iter()
        .map(|n| graph.node(*n).map(|node| node.position))
        .collect();
    let Some(positions) = positions else {
        return false;
    };
    let mean: Vec3 = face.nodes.iter().map(|n| embedding.normal(*n)).sum();
    newell_normal(&positions).dot(mean) > 0.0
}

/// Whether `position` projects inside the cycle's polygon.
fn encloses(cycle: &Cycle, position: Vec3) -> bool {
    let normal = cycle.area_vector();
    let mut points = cycle.positions.clone();
    points.push(position);
    let projected = project(&points, normal);
    let (polygon, point) = projected.split_at(cycle.positions.len());
    contains_point(polygon, point[0])
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Visit {
    cost: f32,
    node: NodeId,
}

impl Eq for Visit {}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest closed walk leaving `start` through `first` and returning to it
/// without reusing `first` or any `excluded` segment.
fn shortest_loop(
    graph: &Graph,
    start: NodeId,
    first: SegmentId,
    excluded: &HashSet<SegmentId>,
) -> Option<(Vec<NodeId>, Vec<SegmentId>)> {
    let first_segment = graph.segment(first)?;
    let origin = first_segment.other_end(start)?;

    let mut best: HashMap<NodeId, f32> = HashMap::from([(origin, 0.0)]);
    let mut came_from: HashMap<NodeId, (NodeId, SegmentId)> = HashMap::new();
    let mut heap = BinaryHeap::from([Visit {
        cost: 0.0,
        node: origin,
    }]);

    while let Some(Visit { cost, node }) = heap.pop() {
        if node == start {
            break;
        }
        if cost > best.get(&node).copied().unwrap_or(f32::INFINITY) {
            continue;
        }
        for &segment_id in graph.incident(node) {
            if segment_id == first || excluded.contains(&segment_id) {
                continue;
            }
            let Some(segment) = graph.segment(segment_id) else {
                continue;
            };
            let Some(next) = segment.other_end(node) else {
                continue;
            };
            let next_cost = cost + segment.length;
            if next_cost < best.get(&next).copied().unwrap_or(f32::INFINITY) {
                best.insert(next, next_cost);
                came_from.insert(next, (node, segment_id));
                heap.push(Visit {
                    cost: next_cost,
                    node: next,
                });
            }
        }
    }

    // Back from start to origin
    let mut nodes = vec![start];
    let mut segments = Vec::new();
    let mut cursor = start;
    while cursor != origin {
        let (previous, segment) = came_from.get(&cursor).copied()?;
        segments.push(segment);
        nodes.push(previous);
        cursor = previous;
    }

    // start, origin, ..., with `first` closing start -> origin
    nodes.reverse();
    nodes.rotate_right(1);
    segments.reverse();
    segments.insert(0, first);
    Some((nodes, segments))
}
