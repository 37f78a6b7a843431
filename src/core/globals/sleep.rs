use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::event::{EventKind, PairEventData, ParticleEventData, Prediction};
use crate::core::globals::{Global, GlobalAction};
use crate::core::math::Vec3;
use crate::core::particle::{Particle, DYNAMIC};
use crate::core::ranges::IdRange;
use crate::error::{Error, Result};
use crate::io::XmlNode;
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::HashSet;

/// Interval between wakeup retries for sleeping particles.
const WAKEUP_RETRY_PERIOD: f64 = 0.5;

/// Inelastic sleep rule: particles whose motion under gravity has converged
/// are frozen, and frozen particles hit hard enough are woken.
///
/// After every pair event between a dynamic and a sleeping particle the
/// rule inspects the dynamic partner: if its velocity is below
/// `sleep_velocity`, directed downward, and both velocity and position have
/// stopped changing (within `converge` along gravity), it is flagged for a
/// SLEEP event. A sleeping partner struck at more than twice
/// `sleep_velocity` is flagged for WAKEUP. The thresholds are tunable; the
/// defaults follow granular-pile experiments and are deliberately loose.
#[derive(Debug)]
pub struct GSleep {
    name: String,
    range: IdRange,
    sleep_velocity: f64,
    converge: f64,
    wake_velocity: f64,
    state_change: HashSet<usize>,
    last_position: Vec<Vec3>,
    last_velocity: Vec<Vec3>,
}

impl GSleep {
    pub fn new(name: impl Into<String>, range: IdRange, sleep_velocity: f64) -> Result<Self> {
        if !sleep_velocity.is_finite() || sleep_velocity <= 0.0 {
            return Err(Error::InvalidParam(
                "sleep velocity must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            range,
            sleep_velocity,
            converge: 0.01,
            wake_velocity: 0.1,
            state_change: HashSet::new(),
            last_position: Vec::new(),
            last_velocity: Vec::new(),
        })
    }

    /// Override the convergence threshold (default 0.01).
    pub fn with_converge(mut self, converge: f64) -> Self {
        self.converge = converge;
        self
    }

    /// Override the post-wakeup speed (default 0.1).
    pub fn with_wake_velocity(mut self, wake_velocity: f64) -> Self {
        self.wake_velocity = wake_velocity;
        self
    }

    pub fn sleep_velocity(&self) -> f64 {
        self.sleep_velocity
    }
}

impl Global for GSleep {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()> {
        self.last_position = vec![Vec3::zero(); ctx.particles.len()];
        self.last_velocity = vec![Vec3::zero(); ctx.particles.len()];
        Ok(())
    }

    fn is_interaction(&self, p: &Particle) -> bool {
        self.range.contains(p.id, self.last_position.len())
    }

    fn consumes_time(&self) -> bool {
        true
    }

    fn get_event(&self, ctx: &PredictCtx<'_>, p: usize) -> Result<Prediction> {
        let particle = &ctx.particles[p];
        if self.state_change.contains(&p) {
            let kind = if particle.is_dynamic() {
                EventKind::Sleep
            } else {
                EventKind::Wakeup
            };
            return Ok(Prediction::new(0.0, kind));
        }
        if !particle.is_dynamic() {
            return Ok(Prediction::new(WAKEUP_RETRY_PERIOD, EventKind::Wakeup));
        }
        Ok(Prediction::none())
    }

    fn run_event(&mut self, ctx: &mut EventCtx<'_>, p: usize, _dt: f64) -> Result<GlobalAction> {
        let going_to_sleep =
            self.state_change.contains(&p) && ctx.particles[p].is_dynamic();
        ctx.dynamics
            .update_particle(ctx.boundary, &mut ctx.particles[p], ctx.system_time);

        let particle = &mut ctx.particles[p];
        let mass = ctx.properties.mass(p);
        let ke_before = particle.kinetic_energy(mass);

        let kind = if going_to_sleep {
            particle.clear_state(DYNAMIC);
            particle.vel = Vec3::zero();
            EventKind::Sleep
        } else {
            particle.set_state(DYNAMIC);
            let mut dir = Vec3::new(
                ctx.rng.sample::<f64, _>(StandardNormal),
                ctx.rng.sample::<f64, _>(StandardNormal),
                ctx.rng.sample::<f64, _>(StandardNormal),
            );
            dir = dir.normalized().unwrap_or(Vec3::new(0.0, 0.0, 1.0));
            particle.vel = dir * self.wake_velocity;
            EventKind::Wakeup
        };
        self.state_change.remove(&p);

        Ok(GlobalAction::StateChange {
            data: ParticleEventData {
                particle: p,
                kind,
                delta_ke: ctx.particles[p].kinetic_energy(mass) - ke_before,
            },
        })
    }

    fn particles_updated(&mut self, particles: &[Particle], data: &PairEventData) {
        let n = self.last_position.len();
        let (p1, p2) = (data.p1, data.p2);
        if !(self.range.contains(p1, n) || self.range.contains(p2, n)) {
            return;
        }
        if particles[p1].is_dynamic() == particles[p2].is_dynamic() {
            return;
        }
        let (dp, sp) = if particles[p1].is_dynamic() {
            (p1, p2)
        } else {
            (p2, p1)
        };

        let g = Vec3::new(0.0, 0.0, -1.0);
        let speed = particles[dp].vel.norm();

        if self.range.contains(dp, n) {
            let vel_drift = (particles[dp].vel - self.last_velocity[dp]).dot(g);
            let converge_vel = vel_drift > 0.0 && vel_drift < self.converge;
            let converge_pos =
                (particles[dp].pos - self.last_position[dp]).dot(g) < self.converge;
            let falling = particles[dp].vel.dot(g) > 0.0;
            if speed < self.sleep_velocity && falling && converge_vel && converge_pos {
                self.state_change.insert(dp);
            }
        }

        if speed > 2.0 * self.sleep_velocity && self.range.contains(sp, n) {
            self.state_change.insert(sp);
        }

        for id in [p1, p2] {
            self.last_velocity[id] = particles[id].vel;
            self.last_position[id] = particles[id].pos;
        }
    }

    fn output_xml(&self) -> XmlNode {
        XmlNode::new("Global")
            .attr("Type", "Sleep")
            .attr("Name", &self.name)
            .attr("SleepV", self.sleep_velocity)
            .attr("Converge", self.converge)
            .attr("WakeV", self.wake_velocity)
    }
}
