//! Uniform grid for radius queries around atoms, points and sets

use ahash::AHashMap;
use lin_alg::f32::Vec3;

type CellKey = (i32, i32, i32);

/// Hash grid whose cell edge equals the query radius, so every hit lies in
/// the 3x3x3 block of cells around the probe.
pub struct SpatialGrid {
    cells: AHashMap<CellKey, Vec<usize>>,
    cell_size: f32,
}

impl SpatialGrid {
    /// Grid over the given `(index, position)` pairs
    pub fn build(radius: f32, points: impl IntoIterator<Item = (usize, Vec3)>) -> Self {
        let cell_size = radius.max(0.1);
        let mut grid = SpatialGrid {
            cells: AHashMap::new(),
            cell_size,
        };
        for (idx, pos) in points {
            let key = grid.key(pos);
            grid.cells.entry(key).or_default().push(idx);
        }
        grid
    }

    fn key(&self, pos: Vec3) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    /// Candidate indices near `pos`; callers still check the exact distance
    pub fn candidates(&self, pos: Vec3, out: &mut Vec<usize>) {
        out.clear();
        let (cx, cy, cz) = self.key(pos);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(cell) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        out.extend_from_slice(cell);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_cover_radius() {
        let grid = SpatialGrid::build(
            2.0,
            [
                (0, Vec3::new(0.0, 0.0, 0.0)),
                (1, Vec3::new(1.9, 0.0, 0.0)),
                (2, Vec3::new(-1.5, -1.0, 0.0)),
                (3, Vec3::new(50.0, 0.0, 0.0)),
            ],
        );
        let mut out = Vec::new();
        grid.candidates(Vec3::new(0.1, 0.1, 0.0), &mut out);
        out.sort();
        assert_eq!(out, vec![0, 1, 2]);
    }
}
