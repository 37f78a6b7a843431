//! Morton-indexed cell storage shared by the neighbour-list globals.

use crate::core::bc::Boundary;
use crate::core::math::Vec3;
use crate::core::morton::{MortonNumber, DILATED_BITS};
use crate::core::particle::Particle;
use crate::error::{Error, Result};

/// Particle membership of the cell grid.
///
/// Invariant: every particle id appears in exactly one cell list, and
/// `cell_of` names that cell.
#[derive(Debug, Clone)]
pub struct CellData {
    lists: Vec<Vec<usize>>,
    cell_of: Vec<u64>,
}

impl CellData {
    pub fn new(n_particles: usize, key_space: usize) -> Self {
        Self {
            lists: vec![Vec::new(); key_space],
            cell_of: vec![0; n_particles],
        }
    }

    pub fn insert(&mut self, pid: usize, key: u64) {
        self.lists[key as usize].push(pid);
        self.cell_of[pid] = key;
    }

    pub fn move_to(&mut self, old_key: u64, new_key: u64, pid: usize) {
        let list = &mut self.lists[old_key as usize];
        if let Some(at) = list.iter().position(|&id| id == pid) {
            list.swap_remove(at);
        }
        self.lists[new_key as usize].push(pid);
        self.cell_of[pid] = new_key;
    }

    #[inline]
    pub fn contents(&self, key: u64) -> &[usize] {
        &self.lists[key as usize]
    }

    #[inline]
    pub fn cell_of(&self, pid: usize) -> u64 {
        self.cell_of[pid]
    }
}

/// Geometry of a cell grid over the primary image, plus its membership
/// data. Cells are addressed by Morton keys so walking the neighbourhood
/// is constant-time per step.
#[derive(Debug, Clone)]
pub struct CellGrid {
    pub cell_count: [u64; 3],
    pub cell_width: Vec3,
    pub overlink: usize,
    pub box_size: Vec3,
    pub data: CellData,
}

impl CellGrid {
    /// Size the grid so each cell spans at least `max_int_dist` plus a
    /// small safety margin, and file every particle into its cell.
    pub fn build(
        particles: &[Particle],
        boundary: &Boundary,
        max_int_dist: f64,
        overlink: usize,
        time: f64,
    ) -> Result<Self> {
        if !max_int_dist.is_finite() || max_int_dist <= 0.0 {
            return Err(Error::Config(format!(
                "cannot size cells: max interaction distance {max_int_dist} is not positive"
            )));
        }
        let box_size = boundary.box_size;
        let min_cells = (2 * overlink + 1) as u64;
        let mut cell_count = [0u64; 3];
        for k in 0..3 {
            let count = (box_size[k] / (max_int_dist * (1.0 + 1e-10))).floor() as u64;
            if count < min_cells {
                return Err(Error::Config(format!(
                    "cell width would fall below the interaction reach: axis {k} fits {count} \
                     cells of {max_int_dist} but at least {min_cells} are needed"
                )));
            }
            if count >= (1 << DILATED_BITS) {
                return Err(Error::Config(format!(
                    "axis {k} needs {count} cells, beyond the {DILATED_BITS}-bit Morton range"
                )));
            }
            cell_count[k] = count;
        }
        let cell_width = Vec3::new(
            box_size.x / cell_count[0] as f64,
            box_size.y / cell_count[1] as f64,
            box_size.z / cell_count[2] as f64,
        );

        let pow2 = cell_count
            .iter()
            .max()
            .copied()
            .unwrap_or(1)
            .next_power_of_two();
        let key_space = (pow2 * pow2 * pow2) as usize;

        let mut grid = Self {
            cell_count,
            cell_width,
            overlink,
            box_size,
            data: CellData::new(particles.len(), key_space),
        };
        for p in particles {
            let key = grid.coords_of(p.pos, boundary, time).key();
            grid.data.insert(p.id, key);
        }
        Ok(grid)
    }

    /// Cell coordinates containing a position (after boundary remapping).
    pub fn coords_of(&self, pos: Vec3, boundary: &Boundary, time: f64) -> MortonNumber {
        let mut wrapped = pos;
        boundary.apply_bc(&mut wrapped, time);
        let mut c = [0u64; 3];
        for k in 0..3 {
            let idx = ((wrapped[k] + 0.5 * self.box_size[k]) / self.cell_width[k]).floor();
            c[k] = (idx.max(0.0) as u64).min(self.cell_count[k] - 1);
        }
        MortonNumber::new(c[0], c[1], c[2])
    }

    /// Spatial origin (low corner) of a cell.
    pub fn origin(&self, m: &MortonNumber) -> Vec3 {
        Vec3::new(
            m.get(0) as f64 * self.cell_width.x - 0.5 * self.box_size.x,
            m.get(1) as f64 * self.cell_width.y - 0.5 * self.box_size.y,
            m.get(2) as f64 * self.cell_width.z - 0.5 * self.box_size.z,
        )
    }

    pub fn cell_of(&self, pid: usize) -> MortonNumber {
        MortonNumber::from_key(self.data.cell_of(pid))
    }

    /// All particles in the `(2 overlink + 1)^3` neighbourhood of a cell.
    pub fn neighbourhood(&self, centre: &MortonNumber, out: &mut Vec<usize>) {
        let reach = self.overlink;
        let span = 2 * reach + 1;
        let mut corner = *centre;
        for axis in 0..3 {
            for _ in 0..reach {
                corner.step(axis, false, self.cell_count[axis]);
            }
        }
        let mut walker = corner;
        for _ in 0..span {
            let saved_y = walker;
            for _ in 0..span {
                let saved_x = walker;
                for _ in 0..span {
                    out.extend_from_slice(self.data.contents(walker.key()));
                    walker.step(0, true, self.cell_count[0]);
                }
                walker = saved_x;
                walker.step(1, true, self.cell_count[1]);
            }
            walker = saved_y;
            walker.step(2, true, self.cell_count[2]);
        }
    }

    /// The freshly-exposed plane of cells after a transition along `axis`:
    /// centred `overlink` cells beyond the entered cell, spanning the two
    /// transverse axes.
    pub fn plane_ahead(
        &self,
        entered: &MortonNumber,
        axis: usize,
        forward: bool,
        out: &mut Vec<usize>,
    ) {
        let mut centre = *entered;
        for _ in 0..self.overlink {
            centre.step(axis, forward, self.cell_count[axis]);
        }
        let dim1 = (axis + 1) % 3;
        let dim2 = (axis + 2) % 3;
        let span = 2 * self.overlink + 1;
        for _ in 0..self.overlink {
            centre.step(dim1, false, self.cell_count[dim1]);
            centre.step(dim2, false, self.cell_count[dim2]);
        }
        let mut walker = centre;
        for _ in 0..span {
            let saved = walker;
            for _ in 0..span {
                out.extend_from_slice(self.data.contents(walker.key()));
                walker.step(dim1, true, self.cell_count[dim1]);
            }
            walker = saved;
            walker.step(dim2, true, self.cell_count[dim2]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bc::BoundaryKind;

    fn grid_fixture() -> (CellGrid, Boundary) {
        let boundary =
            Boundary::new(BoundaryKind::Periodic, Vec3::new(10.0, 10.0, 10.0)).unwrap();
        let particles: Vec<Particle> = (0..4)
            .map(|i| {
                Particle::new(
                    i,
                    Vec3::new(-4.0 + 2.5 * i as f64, 0.0, 0.0),
                    Vec3::zero(),
                )
                .unwrap()
            })
            .collect();
        let grid = CellGrid::build(&particles, &boundary, 1.0, 1, 0.0).unwrap();
        (grid, boundary)
    }

    #[test]
    fn every_particle_lands_in_its_cell() {
        let (grid, boundary) = grid_fixture();
        for pid in 0..4 {
            let key = grid.data.cell_of(pid);
            assert!(grid.data.contents(key).contains(&pid));
            let _ = boundary;
        }
    }

    #[test]
    fn coords_match_origin() {
        let (grid, boundary) = grid_fixture();
        let pos = Vec3::new(3.3, -1.2, 4.9);
        let m = grid.coords_of(pos, &boundary, 0.0);
        let origin = grid.origin(&m);
        for k in 0..3 {
            assert!(origin[k] <= pos[k] && pos[k] < origin[k] + grid.cell_width[k]);
        }
    }

    #[test]
    fn move_to_preserves_single_membership() {
        let (mut grid, _) = grid_fixture();
        let old = grid.data.cell_of(0);
        let mut target = MortonNumber::from_key(old);
        target.step(2, true, grid.cell_count[2]);
        grid.data.move_to(old, target.key(), 0);
        assert!(!grid.data.contents(old).contains(&0));
        assert!(grid.data.contents(target.key()).contains(&0));
        assert_eq!(grid.data.cell_of(0), target.key());
    }

    #[test]
    fn neighbourhood_finds_close_particles() {
        let (grid, _) = grid_fixture();
        // Particles 0 (-4.0) and 1 (-1.5) are 2.5 apart with unit cells:
        // not neighbours. Particle at the same cell must always appear.
        let mut out = Vec::new();
        grid.neighbourhood(&grid.cell_of(0), &mut out);
        assert!(out.contains(&0));
    }

    #[test]
    fn neighbourhood_covers_27_cells_worth() {
        let boundary =
            Boundary::new(BoundaryKind::Periodic, Vec3::new(9.0, 9.0, 9.0)).unwrap();
        // Two particles one cell apart diagonally.
        let particles = vec![
            Particle::new(0, Vec3::new(0.5, 0.5, 0.5), Vec3::zero()).unwrap(),
            Particle::new(1, Vec3::new(1.5, 1.5, 1.5), Vec3::zero()).unwrap(),
        ];
        let grid = CellGrid::build(&particles, &boundary, 1.0, 1, 0.0).unwrap();
        let mut out = Vec::new();
        grid.neighbourhood(&grid.cell_of(0), &mut out);
        assert!(out.contains(&1), "diagonal cell neighbour missing: {out:?}");
    }

    #[test]
    fn too_small_box_is_a_config_error() {
        let boundary =
            Boundary::new(BoundaryKind::Periodic, Vec3::new(2.0, 2.0, 2.0)).unwrap();
        let particles = vec![Particle::new(0, Vec3::zero(), Vec3::zero()).unwrap()];
        assert!(CellGrid::build(&particles, &boundary, 1.0, 1, 0.0).is_err());
    }
}
