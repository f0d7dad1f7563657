//! Grid-cell neighbor lookup used by the swap moves.
//!
//! The cell is partitioned into a uniform grid; two beads interact through a
//! swap candidate list when their grid cells are adjacent (with wraparound in
//! periodic dimensions).  The candidate list is rebuilt on demand from the
//! path, so the grid never holds stale bead locators across deletions.

use crate::container::Container;
use crate::path::{Bead, Path};

pub struct Lookup<const D: usize> {
    num_cells: [usize; D],
    cell_side: [f64; D],
    periodic: [bool; D],
    /// Beads collected by the latest `update_full_interaction_list` call.
    pub full_bead_list: Vec<Bead>,
}

impl<const D: usize> Lookup<D> {
    /// Build a grid whose cells are at least `min_cell_side` wide.
    pub fn new(cell: &Container<D>, min_cell_side: f64) -> Self {
        assert!(min_cell_side > 0.0, "grid cell side must be positive");
        let mut num_cells = [1usize; D];
        let mut cell_side = [0.0; D];
        for i in 0..D {
            num_cells[i] = ((cell.side[i] / min_cell_side).floor() as usize).max(1);
            cell_side[i] = cell.side[i] / num_cells[i] as f64;
        }
        Lookup {
            num_cells,
            cell_side,
            periodic: cell.periodic,
            full_bead_list: Vec::new(),
        }
    }

    pub fn full_num_beads(&self) -> usize {
        self.full_bead_list.len()
    }

    fn grid_index(&self, path: &Path<D>, b: Bead) -> [usize; D] {
        let pos = path.pos(b);
        let mut index = [0usize; D];
        for i in 0..D {
            let shifted = pos[i] + 0.5 * path.cell.side[i];
            let k = (shifted / self.cell_side[i]).floor() as isize;
            index[i] = k.clamp(0, self.num_cells[i] as isize - 1) as usize;
        }
        index
    }

    fn cells_adjacent(&self, a: &[usize; D], b: &[usize; D]) -> bool {
        for i in 0..D {
            let n = self.num_cells[i];
            if n <= 2 {
                // Every cell touches every other along this dimension.
                continue;
            }
            let d = (a[i] + n - b[i]) % n;
            let adjacent = if self.periodic[i] {
                d == 0 || d == 1 || d == n - 1
            } else {
                a[i].abs_diff(b[i]) <= 1
            };
            if !adjacent {
                return false;
            }
        }
        true
    }

    /// Collect every bead on `slice` whose grid cell is adjacent to the cell
    /// of `center` (which normally lives on a different slice).
    pub fn update_full_interaction_list(&mut self, path: &Path<D>, center: Bead, slice: usize) {
        let center_cell = self.grid_index(path, center);
        self.full_bead_list.clear();
        for b in path.beads_at_slice(slice) {
            let cell = self.grid_index(path, b);
            if self.cells_adjacent(&center_cell, &cell) {
                self.full_bead_list.push(b);
            }
        }
    }

    /// Whether two beads sit in adjacent (or identical) grid cells.
    pub fn grid_neighbors(&self, path: &Path<D>, a: Bead, b: Bead) -> bool {
        self.cells_adjacent(&self.grid_index(path, a), &self.grid_index(path, b))
    }

    /// Whether two beads share the same grid cell.
    pub fn grid_share(&self, path: &Path<D>, a: Bead, b: Bead) -> bool {
        self.grid_index(path, a) == self.grid_index(path, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worm::Worm;
    use nalgebra::Vector3;

    fn path_with(positions: &[(usize, [f64; 3])]) -> Path<3> {
        let mut path = Path::new(4, Container::cube(12.0, true), Worm::new(1.0));
        for &(slice, p) in positions {
            path.add_bead(slice, Vector3::new(p[0], p[1], p[2]));
        }
        path
    }

    #[test]
    fn interaction_list_filters_by_cell() {
        let path = path_with(&[
            (0, [0.0, 0.0, 0.0]),
            (1, [0.5, 0.5, 0.0]),
            (1, [-4.5, -4.5, -4.5]),
        ]);
        let mut lookup = Lookup::new(&path.cell, 3.0);
        lookup.update_full_interaction_list(&path, Bead::new(0, 0), 1);
        assert_eq!(lookup.full_bead_list, vec![Bead::new(1, 0)]);
    }

    #[test]
    fn periodic_wrap_counts_as_adjacent() {
        let path = path_with(&[(0, [-5.9, 0.0, 0.0]), (1, [5.9, 0.0, 0.0])]);
        let lookup = Lookup::new(&path.cell, 3.0);
        assert!(lookup.grid_neighbors(&path, Bead::new(0, 0), Bead::new(1, 0)));
        assert!(!lookup.grid_share(&path, Bead::new(0, 0), Bead::new(1, 0)));
    }

    #[test]
    fn share_requires_same_cell() {
        let path = path_with(&[(0, [0.2, 0.2, 0.2]), (1, [0.4, 0.4, 0.4])]);
        let lookup = Lookup::new(&path.cell, 3.0);
        assert!(lookup.grid_share(&path, Bead::new(0, 0), Bead::new(1, 0)));
    }
}
