//! Explicit call contexts handed to physics plugins.
//!
//! Plugins never hold a back-reference to the simulation; every call
//! receives exactly the state it is allowed to touch. Prediction contexts
//! are read-only (participants are streamed by the scheduler beforehand),
//! event-execution contexts carry the mutable particle store and RNG.

use crate::core::bc::Boundary;
use crate::core::dynamics::Dynamics;
use crate::core::particle::Particle;
use crate::core::properties::Properties;
use rand::rngs::StdRng;

/// Read-only view for event prediction and validation.
pub struct PredictCtx<'a> {
    pub particles: &'a [Particle],
    pub boundary: &'a Boundary,
    pub dynamics: &'a Dynamics,
    pub properties: &'a Properties,
    pub system_time: f64,
}

impl PredictCtx<'_> {
    /// Minimum-image separation and relative velocity of a pair.
    pub fn pair_separation(&self, p1: usize, p2: usize) -> (crate::core::math::Vec3, crate::core::math::Vec3) {
        self.boundary.separation(
            self.particles[p1].pos - self.particles[p2].pos,
            self.particles[p1].vel - self.particles[p2].vel,
            self.system_time,
        )
    }
}

/// Mutable view for event execution.
pub struct EventCtx<'a> {
    pub particles: &'a mut [Particle],
    pub boundary: &'a Boundary,
    pub dynamics: &'a mut Dynamics,
    pub properties: &'a Properties,
    pub system_time: f64,
    pub rng: &'a mut StdRng,
}

/// State available to plugins at initialisation time.
pub struct InitCtx<'a> {
    pub particles: &'a [Particle],
    pub boundary: &'a Boundary,
    pub properties: &'a Properties,
    /// Largest interaction reach over all loaded interactions; sizes
    /// neighbour-list cells.
    pub max_int_dist: f64,
    pub system_time: f64,
    pub rng: &'a mut StdRng,
}
