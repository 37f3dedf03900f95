//! Crystallographic unit cell
//!
//! Supplies the fractional coordinates behind `cell=555` comparisons and
//! the Miller-index planes behind `within(distance, hkl, {h k l})`.

use lin_alg::f32::Vec3;
use serde::{Deserialize, Serialize};

/// Unit cell edge lengths (Angstrom) and angles (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl UnitCell {
    pub fn new(a: f32, b: f32, c: f32, alpha: f32, beta: f32, gamma: f32) -> Self {
        UnitCell { a, b, c, alpha, beta, gamma }
    }

    /// Rectangular cell
    pub fn orthorhombic(a: f32, b: f32, c: f32) -> Self {
        Self::new(a, b, c, 90.0, 90.0, 90.0)
    }

    /// Cartesian cell vectors with `a` along x and `b` in the xy plane
    pub fn axes(&self) -> [Vec3; 3] {
        let (ca, cb) = (self.alpha.to_radians().cos(), self.beta.to_radians().cos());
        let (cg, sg) = (self.gamma.to_radians().cos(), self.gamma.to_radians().sin());
        let v = (1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg).max(0.0).sqrt();
        [
            Vec3::new(self.a, 0.0, 0.0),
            Vec3::new(self.b * cg, self.b * sg, 0.0),
            Vec3::new(self.c * cb, self.c * (ca - cb * cg) / sg, self.c * v / sg),
        ]
    }

    pub fn to_cartesian(&self, frac: Vec3) -> Vec3 {
        let [a, b, c] = self.axes();
        a * frac.x + b * frac.y + c * frac.z
    }

    pub fn to_fractional(&self, pos: Vec3) -> Vec3 {
        let [a, b, c] = self.axes();
        let fz = pos.z / c.z;
        let fy = (pos.y - fz * c.y) / b.y;
        let fx = (pos.x - fy * b.x - fz * c.x) / a.x;
        Vec3::new(fx, fy, fz)
    }

    /// Cell triple in the 555 convention: the origin cell is `{1 1 1}`
    pub fn cell_of(&self, pos: Vec3) -> [i32; 3] {
        let f = self.to_fractional(pos);
        // Snap coordinates sitting on a face into the lower cell
        let snap = |x: f32| {
            let r = x.round();
            if (x - r).abs() < 1e-4 { r } else { x }
        };
        [
            snap(f.x).floor() as i32 + 1,
            snap(f.y).floor() as i32 + 1,
            snap(f.z).floor() as i32 + 1,
        ]
    }

    /// Plane `[a, b, c, d]` (unit normal) through the Miller intercepts
    pub fn hkl_plane(&self, h: f32, k: f32, l: f32) -> Option<[f32; 4]> {
        let axes = self.axes();
        let mut points = Vec::new();
        let mut directions = Vec::new();
        for (axis, index) in axes.iter().zip([h, k, l]) {
            if index.abs() > f32::EPSILON {
                points.push(*axis / index);
            } else {
                directions.push(*axis);
            }
        }
        let normal = match (points.len(), directions.as_slice()) {
            (3, _) => (points[1] - points[0]).cross(points[2] - points[0]),
            (2, [d]) => (points[1] - points[0]).cross(*d),
            (1, [d1, d2]) => d1.cross(*d2),
            _ => return None,
        };
        let len = normal.magnitude();
        if len < f32::EPSILON {
            return None;
        }
        let n = normal / len;
        Some([n.x, n.y, n.z, -n.dot(points[0])])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_round_trip() {
        let cell = UnitCell::new(10.0, 12.0, 14.0, 80.0, 95.0, 110.0);
        let frac = Vec3::new(0.25, 0.5, 0.75);
        let back = cell.to_fractional(cell.to_cartesian(frac));
        assert!((back.x - 0.25).abs() < 1e-4);
        assert!((back.y - 0.5).abs() < 1e-4);
        assert!((back.z - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_cell_of_uses_555_convention() {
        let cell = UnitCell::orthorhombic(10.0, 10.0, 10.0);
        assert_eq!(cell.cell_of(Vec3::new(5.0, 5.0, 5.0)), [1, 1, 1]);
        assert_eq!(cell.cell_of(Vec3::new(-1.0, 15.0, 5.0)), [0, 2, 1]);
    }

    #[test]
    fn test_hkl_plane() {
        let cell = UnitCell::orthorhombic(10.0, 10.0, 10.0);
        let plane = cell.hkl_plane(1.0, 0.0, 0.0).unwrap();
        assert!((plane[0].abs() - 1.0).abs() < 1e-5);
        // x = 10 lies on the (100) plane
        assert!((plane[0] * 10.0 + plane[3]).abs() < 1e-4);
        assert!(cell.hkl_plane(0.0, 0.0, 0.0).is_none());
    }
}
