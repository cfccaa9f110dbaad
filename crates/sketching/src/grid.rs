//! Snapping lattice.

use filigree_config::GridConfig;
use glam::Vec3;

use crate::spatial::ProximityIndex;

/// A discrete set of snapping points in canvas space.
pub trait Grid3D {
    /// Nearest grid point within `threshold` of `position`.
    fn try_find_constraint(&self, position: Vec3, threshold: f32) -> Option<Vec3>;

    /// The canvas was rescaled.
    fn update_scale(&mut self, _canvas_scale: f32) {}
}

/// Bounded uniform lattice of `(2 * half_extent + 1)^3` points.
#[derive(Debug, Clone)]
pub struct LatticeGrid {
    config: GridConfig,
    points: ProximityIndex<(i32, i32, i32)>,
    canvas_scale: f32,
}

impl LatticeGrid {
    pub fn new(config: GridConfig) -> Self {
        let mut points = ProximityIndex::new(config.spacing);
        let origin = Vec3::from(config.origin);
        let h = config.half_extent as i32;
        for x in -h..=h {
            for y in -h..=h {
                for z in -h..=h {
                    let offset = Vec3::new(x as f32, y as f32, z as f32) * config.spacing;
                    points.insert((x, y, z), origin + offset);
                }
            }
        }
        Self {
            config,
            points,
            canvas_scale: 1.0,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Distance between neighboring points as seen in world space.
    pub fn world_spacing(&self) -> f32 {
        self.config.spacing * self.canvas_scale
    }

    pub fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.points.iter().map(|(_, p)| p)
    }
}

impl Default for LatticeGrid {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

impl Grid3D for LatticeGrid {
    fn try_find_constraint(&self, position: Vec3, threshold: f32) -> Option<Vec3> {
        let (key, _) = self.points.nearest(position, threshold)?;
        self.points.position(key)
    }

    fn update_scale(&mut self, canvas_scale: f32) {
        self.canvas_scale = canvas_scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_size() {
        let grid = LatticeGrid::new(GridConfig {
            spacing: 0.1,
            half_extent: 2,
            origin: [0.0; 3],
        });
        assert_eq!(grid.point_count(), 125);
    }

    #[test]
    fn test_snaps_to_nearest_point() {
        let grid = LatticeGrid::default();
        let p = grid
            .try_find_constraint(Vec3::new(0.105, 0.195, -0.01), 0.02)
            .unwrap();
        assert!(p.abs_diff_eq(Vec3::new(0.1, 0.2, 0.0), 1e-6));
    }

    #[test]
    fn test_nothing_within_threshold() {
        let grid = LatticeGrid::default();
        assert!(grid
            .try_find_constraint(Vec3::new(0.05, 0.05, 0.05), 0.02)
            .is_none());
        // Outside the lattice bounds
        assert!(grid.try_find_constraint(Vec3::splat(10.0), 0.02).is_none());
    }

    #[test]
    fn test_world_spacing_follows_scale() {
        let mut grid = LatticeGrid::default();
        grid.update_scale(2.0);
        assert!((grid.world_spacing() - 0.2).abs() < 1e-6);
    }
}
