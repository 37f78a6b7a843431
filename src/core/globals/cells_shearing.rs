use crate::core::bc::BoundaryKind;
use crate::core::cells::CellGrid;
use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::event::{EventKind, Prediction};
use crate::core::globals::{Global, GlobalAction};
use crate::core::morton::MortonNumber;
use crate::core::particle::Particle;
use crate::error::{Error, Result};
use crate::io::XmlNode;

/// Neighbour-list cells for Lees–Edwards sheared boundaries.
///
/// Identical to [`crate::core::globals::GCells`] away from the shear seam.
/// A particle crossing the y boundary between the top and bottom images
/// enters a cell whose x coordinate is shifted by the instantaneous shear
/// displacement, and particles on the boundary rows see the full-length
/// strip of cells on the opposite face as extra neighbours. Overlinking is
/// not supported here; the strip arithmetic assumes one cell of reach.
#[derive(Debug)]
pub struct GCellsShearing {
    name: String,
    grid: Option<CellGrid>,
}

impl GCellsShearing {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grid: None,
        }
    }

    fn grid(&self) -> Result<&CellGrid> {
        self.grid.as_ref().ok_or_else(|| {
            Error::Config(format!("shearing cell global {} is not initialised", self.name))
        })
    }

    /// The strip of cells on the opposite y face: full length in x, the
    /// z neighbourhood of the given cell.
    fn le_strip(grid: &CellGrid, coords: &MortonNumber, out: &mut Vec<usize>) {
        let y_max = grid.cell_count[1] - 1;
        let mut walker = *coords;
        walker.set(0, 0);
        walker.set(1, if coords.get(1) > 0 { 0 } else { y_max });
        walker.step(2, false, grid.cell_count[2]);
        for _ in 0..3 {
            let saved = walker;
            for _ in 0..grid.cell_count[0] {
                out.extend_from_slice(grid.data.contents(walker.key()));
                walker.step(0, true, grid.cell_count[0]);
            }
            walker = saved;
            walker.step(2, true, grid.cell_count[2]);
        }
    }

    fn on_y_boundary(grid: &CellGrid, coords: &MortonNumber) -> bool {
        coords.get(1) == 0 || coords.get(1) == grid.cell_count[1] - 1
    }
}

impl Global for GCellsShearing {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()> {
        if !matches!(ctx.boundary.kind, BoundaryKind::LeesEdwards { .. }) {
            log::warn!(
                "shearing cell global {} loaded without Lees-Edwards boundaries",
                self.name
            );
        }
        let grid = CellGrid::build(
            ctx.particles,
            ctx.boundary,
            ctx.max_int_dist,
            1,
            ctx.system_time,
        )?;
        log::info!(
            "shearing cell global {}: {} x {} x {} cells",
            self.name,
            grid.cell_count[0],
            grid.cell_count[1],
            grid.cell_count[2],
        );
        self.grid = Some(grid);
        Ok(())
    }

    fn is_interaction(&self, _p: &Particle) -> bool {
        true
    }

    fn get_event(&self, ctx: &PredictCtx<'_>, p: usize) -> Result<Prediction> {
        let grid = self.grid()?;
        let cell = grid.cell_of(p);
        let dt = ctx.dynamics.square_cell_collision_time(
            ctx.boundary,
            &ctx.particles[p],
            grid.origin(&cell),
            grid.cell_width,
            ctx.system_time,
        );
        Ok(Prediction::new(dt, EventKind::Cell))
    }

    fn run_event(&mut self, ctx: &mut EventCtx<'_>, p: usize, _dt: f64) -> Result<GlobalAction> {
        let grid = self
            .grid
            .as_mut()
            .ok_or_else(|| Error::Config("shearing cell global is not initialised".into()))?;

        ctx.dynamics
            .update_particle(ctx.boundary, &mut ctx.particles[p], ctx.system_time);

        let old = grid.cell_of(p);
        let old_y = old.get(1);
        let y_count = grid.cell_count[1];
        let (axis, forward) = ctx.dynamics.square_cell_collision_axis(
            ctx.boundary,
            &ctx.particles[p],
            grid.origin(&old),
            grid.cell_width,
            ctx.system_time,
        );

        let mut entered = old;
        let mut new_neighbours = Vec::new();

        let wrapping_y = axis == 1 && old_y == if forward { y_count - 1 } else { 0 };
        let entering_boundary_y =
            axis == 1 && old_y == if forward { y_count - 2 } else { 1 };

        if wrapping_y {
            // Crossing the shear seam: the entered cell's x coordinate
            // depends on the shear displacement at the crossing time.
            entered.step(1, forward, y_count);

            let dt = ctx.dynamics.square_cell_collision_time(
                ctx.boundary,
                &ctx.particles[p],
                grid.origin(&old),
                grid.cell_width,
                ctx.system_time,
            );
            ctx.dynamics.advance_particle(&mut ctx.particles[p], dt);
            let mut probe = ctx.particles[p].pos;
            ctx.dynamics
                .update_particle(ctx.boundary, &mut ctx.particles[p], ctx.system_time);

            // Push the probe past the seam into the next image, then remap
            // it at the crossing time to pick up the x shift.
            probe.y += (if forward { 0.5 } else { -0.5 }) * grid.cell_width.y;
            let cross_time = ctx.system_time + dt;
            entered.set(
                0,
                grid.coords_of(probe, ctx.boundary, cross_time).get(0),
            );

            grid.data.move_to(old.key(), entered.key(), p);

            // The whole neighbourhood is fresh on the other side of the
            // seam, strip included.
            grid.neighbourhood(&entered, &mut new_neighbours);
            if Self::on_y_boundary(grid, &entered) {
                Self::le_strip(grid, &entered, &mut new_neighbours);
            }
        } else if entering_boundary_y {
            entered.step(1, forward, y_count);
            grid.data.move_to(old.key(), entered.key(), p);
            // Arriving on a boundary row exposes the opposite strip.
            Self::le_strip(grid, &entered, &mut new_neighbours);
        } else {
            entered.step(axis, forward, grid.cell_count[axis]);
            grid.data.move_to(old.key(), entered.key(), p);
            grid.plane_ahead(&entered, axis, forward, &mut new_neighbours);
            // Sliding along z while on a boundary row moves the strip
            // window with the particle.
            if axis == 2 && (old_y == 0 || old_y == y_count - 1) {
                Self::le_strip(grid, &entered, &mut new_neighbours);
            }
        }

        let dt = ctx.dynamics.square_cell_collision_time(
            ctx.boundary,
            &ctx.particles[p],
            grid.origin(&entered),
            grid.cell_width,
            ctx.system_time,
        );
        Ok(GlobalAction::CellTransition {
            replacement: Prediction::new(dt, EventKind::Cell),
            new_neighbours,
        })
    }

    fn neighbours(&self, p: usize) -> Option<Vec<usize>> {
        let grid = self.grid.as_ref()?;
        let cell = grid.cell_of(p);
        let mut out = Vec::new();
        grid.neighbourhood(&cell, &mut out);
        if Self::on_y_boundary(grid, &cell) {
            Self::le_strip(grid, &cell, &mut out);
        }
        Some(out)
    }

    fn output_xml(&self) -> XmlNode {
        XmlNode::new("Global")
            .attr("Type", "ShearingCells")
            .attr("Name", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bc::Boundary;
    use crate::core::dynamics::Dynamics;
    use crate::core::math::Vec3;
    use crate::core::properties::Properties;
    use rand::{rngs::StdRng, SeedableRng};

    struct World {
        boundary: Boundary,
        dynamics: Dynamics,
        properties: Properties,
        particles: Vec<Particle>,
        rng: StdRng,
    }

    fn sheared_world(positions: &[(f64, f64, f64)], vel: Vec3, rate: f64) -> World {
        World {
            boundary: Boundary::new(
                BoundaryKind::LeesEdwards { shear_rate: rate },
                Vec3::new(10.0, 10.0, 10.0),
            )
            .unwrap(),
            dynamics: Dynamics::new(),
            properties: Properties::uniform(1.0).unwrap(),
            particles: positions
                .iter()
                .enumerate()
                .map(|(i, &(x, y, z))| Particle::new(i, Vec3::new(x, y, z), vel).unwrap())
                .collect(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    #[test]
    fn strip_covers_the_full_x_length_of_the_opposite_face() -> Result<()> {
        // One particle on the top row, partners spread along x on the
        // bottom row.
        let mut positions = vec![(0.5, 4.5, 0.5)];
        for i in 0..5 {
            positions.push((-4.5 + 2.0 * i as f64, -4.5, 0.5));
        }
        let mut w = sheared_world(&positions, Vec3::zero(), 0.5);
        let mut cells = GCellsShearing::new("shear");
        let mut init = InitCtx {
            particles: &w.particles,
            boundary: &w.boundary,
            properties: &w.properties,
            max_int_dist: 1.0,
            system_time: 0.0,
            rng: &mut w.rng,
        };
        cells.initialise(&mut init)?;
        let nbs = cells.neighbours(0).expect("neighbour list");
        for pid in 1..=5 {
            assert!(nbs.contains(&pid), "strip misses particle {pid}: {nbs:?}");
        }
        Ok(())
    }

    #[test]
    fn seam_crossing_shifts_the_entered_x_cell() -> Result<()> {
        // Particle just below the top face moving up; shear displacement
        // at the crossing is significant.
        let mut w = sheared_world(&[(0.0, 4.9, 0.5)], Vec3::new(0.0, 1.0, 0.0), 0.4);
        w.particles[0].peculiar_time = 5.35;
        let mut cells = GCellsShearing::new("shear");
        let mut init = InitCtx {
            particles: &w.particles,
            boundary: &w.boundary,
            properties: &w.properties,
            max_int_dist: 1.0,
            system_time: 5.35,
            rng: &mut w.rng,
        };
        cells.initialise(&mut init)?;
        let before_x = cells.grid()?.cell_of(0).get(0);
        let mut ctx = EventCtx {
            particles: &mut w.particles,
            boundary: &w.boundary,
            dynamics: &mut w.dynamics,
            properties: &w.properties,
            system_time: 5.35,
            rng: &mut w.rng,
        };
        cells.run_event(&mut ctx, 0, 0.1)?;
        let after = cells.grid()?.cell_of(0);
        // Wrapped to the bottom row...
        assert_eq!(after.get(1), 0);
        // ...with an x shift from the accumulated strain.
        assert_ne!(after.get(0), before_x);
        Ok(())
    }
}
