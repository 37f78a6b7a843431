use crate::core::math::Vec3;
use crate::error::{Error, Result};

/// State bit: the particle moves ballistically. Cleared when a particle is
/// put to sleep by an inelastic sleep rule; sleeping particles skip
/// streaming entirely.
pub const DYNAMIC: u32 = 1 << 0;

/// A particle in the event-driven engine.
///
/// Fields:
/// - `id`: stable identifier, equal to the particle's index in the store
/// - `pos` / `vel`: Cartesian position and velocity
/// - `peculiar_time`: the simulation time this particle has been
///   ballistically streamed to; always `<=` the global system time
/// - `state`: bitfield, see [`DYNAMIC`]
#[derive(Debug, Clone)]
pub struct Particle {
    pub id: usize,
    pub pos: Vec3,
    pub vel: Vec3,
    pub peculiar_time: f64,
    state: u32,
}

impl Particle {
    /// Create a new dynamic particle after validating finiteness.
    pub fn new(id: usize, pos: Vec3, vel: Vec3) -> Result<Self> {
        if !pos.is_finite() {
            return Err(Error::InvalidParam(format!(
                "particle {id}: position must be finite"
            )));
        }
        if !vel.is_finite() {
            return Err(Error::InvalidParam(format!(
                "particle {id}: velocity must be finite"
            )));
        }
        Ok(Self {
            id,
            pos,
            vel,
            peculiar_time: 0.0,
            state: DYNAMIC,
        })
    }

    #[inline]
    pub fn test_state(&self, bit: u32) -> bool {
        self.state & bit != 0
    }

    #[inline]
    pub fn set_state(&mut self, bit: u32) {
        self.state |= bit;
    }

    #[inline]
    pub fn clear_state(&mut self, bit: u32) {
        self.state &= !bit;
    }

    /// Whether the particle streams; sleeping particles are static until a
    /// wakeup event restores the flag.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.test_state(DYNAMIC)
    }

    /// Kinetic energy for the given mass: m |v|^2 / 2.
    #[inline]
    pub fn kinetic_energy(&self, mass: f64) -> f64 {
        0.5 * mass * self.vel.norm_sq()
    }
}
