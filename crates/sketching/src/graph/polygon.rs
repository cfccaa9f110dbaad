//! Polygon predicates for validating cycles.

use glam::{Vec2, Vec3};

use crate::constants::EPS;

/// Newell area vector: direction is the polygon normal, length twice its area.
pub fn newell_normal(points: &[Vec3]) -> Vec3 {
    let n = points.len();
    let mut normal = Vec3::ZERO;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal
}

pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    points.iter().copied().sum::<Vec3>() / points.len() as f32
}

/// Largest distance of a point from the plane through the centroid.
pub fn plane_deviation(points: &[Vec3], normal: Vec3) -> f32 {
    let n = normal.normalize_or_zero();
    let c = centroid(points);
    points
        .iter()
        .map(|p| (*p - c).dot(n).abs())
        .fold(0.0, f32::max)
}

/// 2D coordinates of points projected onto the plane with `normal`.
pub fn project(points: &[Vec3], normal: Vec3) -> Vec<Vec2> {
    let (u, v) = normal.normalize_or(Vec3::Z).any_orthonormal_pair();
    points.iter().map(|p| Vec2::new(p.dot(u), p.dot(v))).collect()
}

/// Whether no two non-adjacent edges of the closed polygon touch.
pub fn is_simple(polygon: &[Vec2]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[(i + 1) % n]);
        for j in i + 1..n {
            // Skip the edge itself and its neighbors
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (c, d) = (polygon[j], polygon[(j + 1) % n]);
            if segments_intersect(a, b, c, d) {
                return false;
            }
        }
    }
    true
}

/// Even-odd point containment.
pub fn contains_point(polygon: &[Vec2], point: Vec2) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x = pj.x + (point.y - pj.y) / (pi.y - pj.y) * (pi.x - pj.x);
            if point.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn orientation(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

fn on_segment(a: Vec2, b: Vec2, p: Vec2) -> bool {
    p.x >= a.x.min(b.x) - EPS
        && p.x <= a.x.max(b.x) + EPS
        && p.y >= a.y.min(b.y) - EPS
        && p.y <= a.y.max(b.y) + EPS
}

fn segments_intersect(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);

    let tol = EPS * EPS;
    if ((o1 > tol && o2 < -tol) || (o1 < -tol && o2 > tol))
        && ((o3 > tol && o4 < -tol) || (o3 < -tol && o4 > tol))
    {
        return true;
    }

    (o1.abs() <= tol && on_segment(a, b, c))
        || (o2.abs() <= tol && on_segment(a, b, d))
        || (o3.abs() <= tol && on_segment(c, d, a))
        || (o4.abs() <= tol && on_segment(c, d, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Vec3> {
        vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::Y,
        ]
    }

    #[test]
    fn test_newell_normal_is_twice_area() {
        let n = newell_normal(&square());
        assert!(n.abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
        let reversed: Vec<Vec3> = square().into_iter().rev().collect();
        assert!(newell_normal(&reversed).abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1e-6));
    }

    #[test]
    fn test_plane_deviation() {
        let mut points = square();
        assert!(plane_deviation(&points, Vec3::Z) < 1e-6);
        points[2].z = 0.4;
        assert!((plane_deviation(&points, Vec3::Z) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_simple_and_bowtie() {
        let square = project(&square(), Vec3::Z);
        assert!(is_simple(&square));

        let bowtie = vec![
            Vec2::ZERO,
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        assert!(!is_simple(&bowtie));
    }

    #[test]
    fn test_triangle_is_simple() {
        let tri = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
        assert!(is_simple(&tri));
    }

    #[test]
    fn test_contains_point() {
        let square = vec![Vec2::ZERO, Vec2::X, Vec2::new(1.0, 1.0), Vec2::Y];
        assert!(contains_point(&square, Vec2::new(0.5, 0.5)));
        assert!(!contains_point(&square, Vec2::new(1.5, 0.5)));
    }
}
