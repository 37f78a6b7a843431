//! Global events: non-pair events owned by whole-system structures
//! (neighbour-list cells, sleep rules).

mod cells;
mod cells_shearing;
mod sleep;

pub use cells::GCells;
pub use cells_shearing::GCellsShearing;
pub use sleep::GSleep;

use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::event::{PairEventData, ParticleEventData, Prediction};
use crate::core::particle::Particle;
use crate::error::Result;
use crate::io::XmlNode;

/// What the simulation must do after a global event has executed.
pub enum GlobalAction {
    /// A cell transition: processed without streaming the system. The
    /// replacement event re-arms the owner's slot and each new neighbour
    /// gets a fresh interaction prediction.
    CellTransition {
        replacement: Prediction,
        new_neighbours: Vec<usize>,
    },
    /// A particle state change that consumed the event's time (sleep or
    /// wake); the simulation streams beforehand and fully refreshes the
    /// particle afterwards.
    StateChange { data: ParticleEventData },
}

pub trait Global {
    fn name(&self) -> &str;

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()>;

    /// Whether this global schedules events for the particle.
    fn is_interaction(&self, p: &Particle) -> bool;

    fn get_event(&self, ctx: &PredictCtx<'_>, p: usize) -> Result<Prediction>;

    fn run_event(&mut self, ctx: &mut EventCtx<'_>, p: usize, dt: f64) -> Result<GlobalAction>;

    /// True when this global's events advance the system clock. Cell
    /// transitions do not: they are processed as virtual events.
    fn consumes_time(&self) -> bool {
        false
    }

    /// Observation hook invoked after every executed pair event.
    fn particles_updated(&mut self, _particles: &[Particle], _data: &PairEventData) {}

    /// Candidate interaction partners for a particle, if this global
    /// maintains a neighbour list.
    fn neighbours(&self, _p: usize) -> Option<Vec<usize>> {
        None
    }

    fn output_xml(&self) -> XmlNode;
}
