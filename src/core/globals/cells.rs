use crate::core::cells::CellGrid;
use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::event::{EventKind, Prediction};
use crate::core::globals::{Global, GlobalAction};
use crate::core::particle::Particle;
use crate::error::{Error, Result};
use crate::io::XmlNode;

/// The standard neighbour-list global: a Morton-indexed cell grid emitting
/// CELL transition events.
///
/// Transitions are processed without streaming the system; moving the
/// particle's cell assignment at the previous event time is conservative
/// because the cell width is at least the interaction reach.
#[derive(Debug)]
pub struct GCells {
    name: String,
    overlink: usize,
    grid: Option<CellGrid>,
}

impl GCells {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overlink: 1,
            grid: None,
        }
    }

    pub fn with_overlink(mut self, overlink: usize) -> Self {
        self.overlink = overlink.max(1);
        self
    }

    pub fn overlink(&self) -> usize {
        self.overlink
    }

    fn grid(&self) -> Result<&CellGrid> {
        self.grid
            .as_ref()
            .ok_or_else(|| Error::Config(format!("cell global {} is not initialised", self.name)))
    }
}

impl Global for GCells {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()> {
        let grid = CellGrid::build(
            ctx.particles,
            ctx.boundary,
            ctx.max_int_dist,
            self.overlink,
            ctx.system_time,
        )?;
        log::info!(
            "cell global {}: {} x {} x {} cells of width {:?}",
            self.name,
            grid.cell_count[0],
            grid.cell_count[1],
            grid.cell_count[2],
            grid.cell_width,
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
            .ok_or_else(|| Error::Config("cell global is not initialised".into()))?;

        ctx.dynamics
            .update_particle(ctx.boundary, &mut ctx.particles[p], ctx.system_time);

        let old = grid.cell_of(p);
        let (axis, forward) = ctx.dynamics.square_cell_collision_axis(
            ctx.boundary,
            &ctx.particles[p],
            grid.origin(&old),
            grid.cell_width,
            ctx.system_time,
        );

        let mut entered = old;
        entered.step(axis, forward, grid.cell_count[axis]);
        grid.data.move_to(old.key(), entered.key(), p);

        let mut new_neighbours = Vec::new();
        grid.plane_ahead(&entered, axis, forward, &mut new_neighbours);

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
        let mut out = Vec::new();
        grid.neighbourhood(&grid.cell_of(p), &mut out);
        Some(out)
    }

    fn output_xml(&self) -> XmlNode {
        XmlNode::new("Global")
            .attr("Type", "Cells")
            .attr("Name", &self.name)
            .attr("Overlink", self.overlink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bc::{Boundary, BoundaryKind};
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

    fn world(positions: &[(f64, f64, f64)], velocity: Vec3) -> World {
        World {
            boundary: Boundary::new(BoundaryKind::Periodic, Vec3::new(10.0, 10.0, 10.0))
                .unwrap(),
            dynamics: Dynamics::new(),
            properties: Properties::uniform(1.0).unwrap(),
            particles: positions
                .iter()
                .enumerate()
                .map(|(i, &(x, y, z))| {
                    Particle::new(i, Vec3::new(x, y, z), velocity).unwrap()
                })
                .collect(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    #[test]
    fn cell_event_time_matches_geometry() -> Result<()> {
        let mut w = world(&[(0.5, 0.5, 0.5)], Vec3::new(1.0, 0.0, 0.0));
        let mut cells = GCells::new("cells");
        let mut init = InitCtx {
            particles: &w.particles,
            boundary: &w.boundary,
            properties: &w.properties,
            max_int_dist: 1.0,
            system_time: 0.0,
            rng: &mut w.rng,
        };
        cells.initialise(&mut init)?;
        let ctx = PredictCtx {
            particles: &w.particles,
            boundary: &w.boundary,
            dynamics: &w.dynamics,
            properties: &w.properties,
            system_time: 0.0,
        };
        let ev = cells.get_event(&ctx, 0)?;
        assert_eq!(ev.kind, EventKind::Cell);
        // Time to the +x face of the owning cell at unit speed.
        let grid = cells.grid()?;
        let origin = grid.origin(&grid.cell_of(0));
        let expected = origin.x + grid.cell_width.x - 0.5;
        assert!((ev.dt - expected).abs() < 1e-12, "dt = {}", ev.dt);
        Ok(())
    }

    #[test]
    fn transition_moves_the_particle_one_cell() -> Result<()> {
        let mut w = world(&[(0.5, 0.5, 0.5)], Vec3::new(1.0, 0.0, 0.0));
        let mut cells = GCells::new("cells");
        let mut init = InitCtx {
            particles: &w.particles,
            boundary: &w.boundary,
            properties: &w.properties,
            max_int_dist: 1.0,
            system_time: 0.0,
            rng: &mut w.rng,
        };
        cells.initialise(&mut init)?;
        let before = cells.grid()?.cell_of(0).get(0);
        let mut ctx = EventCtx {
            particles: &mut w.particles,
            boundary: &w.boundary,
            dynamics: &mut w.dynamics,
            properties: &w.properties,
            system_time: 0.0,
            rng: &mut w.rng,
        };
        let action = cells.run_event(&mut ctx, 0, 0.5)?;
        let grid = cells.grid()?;
        let after = grid.cell_of(0).get(0);
        assert_eq!(after, (before + 1) % grid.cell_count[0]);
        match action {
            GlobalAction::CellTransition { replacement, .. } => {
                assert_eq!(replacement.kind, EventKind::Cell);
            }
            _ => panic!("expected a cell transition"),
        }
        Ok(())
    }
}
