//! The pair-interaction capability and its concrete implementations.

mod dumbbells;
mod hardsphere;
mod squarewell;

pub use dumbbells::Dumbbells;
pub use hardsphere::HardSphere;
pub use squarewell::SquareWell;

use crate::core::capture::CaptureMap;
use crate::core::context::{EventCtx, PredictCtx};
use crate::core::event::{EventKind, PairEventData, Prediction};
use crate::error::Result;
use crate::io::XmlNode;

/// A pair interaction: predicts the next event between two particles and
/// executes the collision when it fires.
///
/// `get_event` is pure; the scheduler streams both participants to the
/// context's system time before calling it. `run_event` applies impulses
/// and updates the interaction's capture map.
pub trait Interaction {
    fn name(&self) -> &str;

    /// Largest separation at which this interaction can produce an event;
    /// sizes the neighbour-list cells.
    fn max_int_dist(&self) -> f64;

    fn get_event(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Result<Prediction>;

    fn run_event(
        &mut self,
        ctx: &mut EventCtx<'_>,
        p1: usize,
        p2: usize,
        kind: EventKind,
    ) -> Result<PairEventData>;

    /// Consistency check of the capture map (or plain geometry) against
    /// the particle positions; returns a warning description if the pair
    /// is in an invalid state.
    fn validate_state(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Option<String>;

    /// Classify a pair at initialisation: is it inside this interaction's
    /// capture radius?
    fn capture_test(&self, _ctx: &PredictCtx<'_>, _p1: usize, _p2: usize) -> bool {
        false
    }

    /// Record a pair's initial capture state. No-op for interactions
    /// without a capture map.
    fn initialise_capture(&mut self, _ctx: &PredictCtx<'_>, _p1: usize, _p2: usize) {}

    fn capture_map(&self) -> Option<&CaptureMap> {
        None
    }

    fn capture_map_mut(&mut self) -> Option<&mut CaptureMap> {
        None
    }

    /// Whether this interaction needs per-particle orientation state.
    fn uses_rotation(&self) -> bool {
        false
    }

    fn output_xml(&self) -> XmlNode;
}
