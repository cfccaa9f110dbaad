//! Uniform-grid spatial hashing for radius queries.
//!
//! This module provides the proximity index used for:
//! - Snapping the pen onto existing graph nodes
//! - Finding lattice points near the pen
//! - Narrowing committed strokes down to the ones near a point

use std::collections::HashMap;
use std::hash::Hash;

use glam::Vec3;

use crate::constants::DEFAULT_CELL_SIZE;

type CellKey = (i32, i32, i32);

/// A spatial hash of keyed points.
///
/// Points are bucketed into cubic cells of `cell_size`. A query of radius
/// `r` scans `ceil(r / cell_size)` rings of cells around the query point,
/// so the cell size should track the typical query radius.
#[derive(Debug, Clone)]
pub struct ProximityIndex<K> {
    cell_size: f32,
    cells: HashMap<CellKey, Vec<(K, Vec3)>>,
    positions: HashMap<K, Vec3>,
}

impl<K: Copy + Eq + Hash + Ord> Default for ProximityIndex<K> {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl<K: Copy + Eq + Hash + Ord> ProximityIndex<K> {
    /// Create an empty index. Non-positive cell sizes fall back to the default.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: sanitize_cell_size(cell_size),
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Change the cell size, rebucketing every point.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        let cell_size = sanitize_cell_size(cell_size);
        if cell_size == self.cell_size {
            return;
        }
        self.cell_size = cell_size;
        self.cells.clear();
        let entries: Vec<(K, Vec3)> = self.positions.iter().map(|(k, p)| (*k, *p)).collect();
        for (key, position) in entries {
            let cell = self.cell_of(position);
            self.cells.entry(cell).or_default().push((key, position));
        }
    }

    /// Insert a point. An existing entry with the same key is moved.
    pub fn insert(&mut self, key: K, position: Vec3) {
        self.remove(key);
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push((key, position));
        self.positions.insert(key, position);
    }

    /// Remove a point. Returns whether it was present.
    pub fn remove(&mut self, key: K) -> bool {
        let Some(position) = self.positions.remove(&key) else {
            return false;
        };
        let cell = self.cell_of(position);
        if let Some(bucket) = self.cells.get_mut(&cell) {
            if let Some(idx) = bucket.iter().position(|(k, _)| *k == key) {
                bucket.swap_remove(idx);
            }
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
        true
    }

    /// Move a point to a new position.
    pub fn update(&mut self, key: K, position: Vec3) {
        self.insert(key, position);
    }

    pub fn position(&self, key: K) -> Option<Vec3> {
        self.positions.get(&key).copied()
    }

    /// Keys within `radius` of `center`, nearest first.
    ///
    /// Ties in distance are broken by key so results are deterministic.
    pub fn query(&self, center: Vec3, radius: f32) -> Vec<K> {
        self.query_with_distance(center, radius)
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    /// Keys within `radius` of `center` with their distances, nearest first.
    ///
    /// Falls back to scanning every point when the radius covers more cells
    /// than there are points.
    pub fn query_with_distance(&self, center: Vec3, radius: f32) -> Vec<(K, f32)> {
        if radius < 0.0 || !radius.is_finite() || self.positions.is_empty() {
            return Vec::new();
        }

        let radius_sq = radius * radius;
        let rings = (radius / self.cell_size).ceil();
        let span = 2.0 * f64::from(rings) + 1.0;
        let mut results = if span * span * span > self.positions.len() as f64 {
            self.scan_points(center, radius_sq)
        } else {
            // Bounded by the point count above, so the cast cannot saturate
            self.scan_cells(center, rings as i32, radius_sq)
        };

        results.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        results
    }

    fn scan_points(&self, center: Vec3, radius_sq: f32) -> Vec<(K, f32)> {
        self.positions
            .iter()
            .filter_map(|(key, position)| {
                let d_sq = position.distance_squared(center);
                (d_sq <= radius_sq).then(|| (*key, d_sq.sqrt()))
            })
            .collect()
    }

    fn scan_cells(&self, center: Vec3, rings: i32, radius_sq: f32) -> Vec<(K, f32)> {
        let (cx, cy, cz) = self.cell_of(center);
        let mut results = Vec::new();
        for x in cx.saturating_sub(rings)..=cx.saturating_add(rings) {
            for y in cy.saturating_sub(rings)..=cy.saturating_add(rings) {
                for z in cz.saturating_sub(rings)..=cz.saturating_add(rings) {
                    let Some(bucket) = self.cells.get(&(x, y, z)) else {
                        continue;
                    };
                    for (key, position) in bucket {
                        let d_sq = position.distance_squared(center);
                        if d_sq <= radius_sq {
                            results.push((*key, d_sq.sqrt()));
                        }
                    }
                }
            }
        }
        results
    }

    /// Nearest key within `max_radius`.
    pub fn nearest(&self, center: Vec3, max_radius: f32) -> Option<(K, f32)> {
        self.query_with_distance(center, max_radius)
            .into_iter()
            .next()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, Vec3)> + '_ {
        self.positions.iter().map(|(k, p)| (*k, *p))
    }

    fn cell_of(&self, position: Vec3) -> CellKey {
        let c = (position / self.cell_size).floor();
        (c.x as i32, c.y as i32, c.z as i32)
    }
}

fn sanitize_cell_size(cell_size: f32) -> f32 {
    if cell_size.is_finite() && cell_size > 0.0 {
        cell_size
    } else {
        DEFAULT_CELL_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_query() {
        let mut index = ProximityIndex::new(1.0);
        index.insert(0u32, Vec3::new(1.0, 1.0, 1.0));
        index.insert(1u32, Vec3::new(2.0, 2.0, 2.0));
        index.insert(2u32, Vec3::new(8.0, 8.0, 8.0));
        assert_eq!(index.len(), 3);

        let results = index.query(Vec3::new(1.5, 1.5, 1.5), 1.5);
        assert_eq!(results.len(), 2);
        assert!(results.contains(&0));
        assert!(results.contains(&1));
        assert!(!results.contains(&2));
    }

    #[test]
    fn test_query_sorted_by_distance() {
        let mut index = ProximityIndex::new(0.1);
        index.insert(10u32, Vec3::new(0.3, 0.0, 0.0));
        index.insert(11u32, Vec3::new(0.1, 0.0, 0.0));
        index.insert(12u32, Vec3::new(-0.2, 0.0, 0.0));
        assert_eq!(index.query(Vec3::ZERO, 0.5), vec![11, 12, 10]);
    }

    #[test]
    fn test_radius_larger_than_cell() {
        let mut index = ProximityIndex::new(0.01);
        index.insert(0u32, Vec3::new(0.0, 0.0, 0.35));
        assert_eq!(index.query(Vec3::ZERO, 0.4), vec![0]);
        assert!(index.query(Vec3::ZERO, 0.3).is_empty());
    }

    #[test]
    fn test_negative_coordinates() {
        let mut index = ProximityIndex::new(1.0);
        index.insert(0u32, Vec3::new(-0.1, -0.1, -0.1));
        assert_eq!(index.query(Vec3::new(0.1, 0.1, 0.1), 0.5), vec![0]);
    }

    #[test]
    fn test_reinsert_moves_without_duplicates() {
        let mut index = ProximityIndex::new(1.0);
        index.insert(0u32, Vec3::ZERO);
        index.insert(0u32, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(index.len(), 1);
        assert_eq!(index.query(Vec3::ZERO, 10.0), vec![0]);
        assert_eq!(index.position(0), Some(Vec3::new(0.5, 0.0, 0.0)));
    }

    #[test]
    fn test_remove() {
        let mut index = ProximityIndex::new(1.0);
        index.insert(0u32, Vec3::ZERO);
        assert!(index.remove(0));
        assert!(!index.remove(0));
        assert!(index.query(Vec3::ZERO, 1.0).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_empty_query() {
        let index: ProximityIndex<u32> = ProximityIndex::default();
        assert!(index.query(Vec3::ZERO, 1.0).is_empty());
        assert!(index.nearest(Vec3::ZERO, 1.0).is_none());
    }

    #[test]
    fn test_set_cell_size_keeps_points() {
        let mut index = ProximityIndex::new(1.0);
        for i in 0..20u32 {
            index.insert(i, Vec3::new(i as f32 * 0.05, 0.0, 0.0));
        }
        index.set_cell_size(0.02);
        assert_eq!(index.len(), 20);
        let near = index.query(Vec3::new(0.5, 0.0, 0.0), 0.06);
        assert_eq!(near.len(), 3);
        assert_eq!(near[0], 10);
        assert!(near.contains(&9) && near.contains(&11));
    }

    #[test]
    fn test_huge_radius_scans_points() {
        let mut index = ProximityIndex::new(0.05);
        index.insert(0u32, Vec3::new(1.0, 0.0, 0.0));
        index.insert(1u32, Vec3::new(-30.0, 0.0, 0.0));
        assert_eq!(index.query(Vec3::ZERO, 50.0), vec![0, 1]);
        assert_eq!(index.query(Vec3::ZERO, 1e9), vec![0, 1]);
        assert_eq!(index.query(Vec3::ZERO, 10.0), vec![0]);
        assert_eq!(index.nearest(Vec3::new(1e6, 0.0, 0.0), f32::MAX).map(|(k, _)| k), Some(0));
    }

    #[test]
    fn test_nearest() {
        let mut index = ProximityIndex::new(0.5);
        index.insert(1u32, Vec3::new(0.2, 0.0, 0.0));
        index.insert(2u32, Vec3::new(0.0, 0.1, 0.0));
        let (key, distance) = index.nearest(Vec3::ZERO, 1.0).unwrap();
        assert_eq!(key, 2);
        assert!((distance - 0.1).abs() < 1e-6);
    }
}
