//! The simulation: particle store, dynamics, plugins and the event loop.

use crate::core::bc::{Boundary, BoundaryKind};
use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::dynamics::Dynamics;
use crate::core::event::{Event, EventClass, EventKind, NO_PARTICLE};
use crate::core::globals::{Global, GlobalAction};
use crate::core::interactions::{HardSphere, Interaction};
use crate::core::locals::Local;
use crate::core::math::Vec3;
use crate::core::particle::Particle;
use crate::core::properties::Properties;
use crate::core::globals::GCells;
use crate::core::scheduler::Scheduler;
use crate::core::systems::{System, Ticker};
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Small numeric tolerance for time comparisons.
const EPS_TIME: f64 = 1e-12;

/// Termination conditions for [`Simulation::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunConditions {
    pub end_time: Option<f64>,
    pub max_events: Option<u64>,
}

impl RunConditions {
    pub fn until(end_time: f64) -> Self {
        Self {
            end_time: Some(end_time),
            max_events: None,
        }
    }

    pub fn events(max_events: u64) -> Self {
        Self {
            end_time: None,
            max_events: Some(max_events),
        }
    }
}

/// An event-driven molecular dynamics simulation.
pub struct Simulation {
    pub particles: Vec<Particle>,
    pub properties: Properties,
    pub boundary: Boundary,
    pub dynamics: Dynamics,
    pub interactions: Vec<Box<dyn Interaction>>,
    pub globals: Vec<Box<dyn Global>>,
    pub locals: Vec<Box<dyn Local>>,
    pub systems: Vec<Box<dyn System>>,
    pub tickers: Vec<Box<dyn Ticker>>,
    scheduler: Scheduler,
    system_time: f64,
    event_count: u64,
    rng: StdRng,
    initialised: bool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("particles", &self.particles.len())
            .field("properties", &self.properties)
            .field("boundary", &self.boundary)
            .field("dynamics", &self.dynamics)
            .field("interactions", &self.interactions.len())
            .field("globals", &self.globals.len())
            .field("locals", &self.locals.len())
            .field("systems", &self.systems.len())
            .field("tickers", &self.tickers.len())
            .field("scheduler", &self.scheduler)
            .field("system_time", &self.system_time)
            .field("event_count", &self.event_count)
            .field("initialised", &self.initialised)
            .finish()
    }
}

impl Simulation {
    /// Assemble a simulation from pre-built particles. Plugins are added
    /// afterwards; call [`Simulation::initialise`] before running.
    pub fn new(
        particles: Vec<Particle>,
        boundary: Boundary,
        properties: Properties,
        seed: Option<u64>,
    ) -> Result<Self> {
        if particles.is_empty() {
            return Err(Error::InvalidParam("at least one particle is required".into()));
        }
        for (i, p) in particles.iter().enumerate() {
            if p.id != i {
                return Err(Error::InvalidParam(format!(
                    "particle ids must be dense: index {i} holds id {}",
                    p.id
                )));
            }
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::seed_from_u64(rand::rng().random()),
        };
        Ok(Self {
            particles,
            properties,
            boundary,
            dynamics: Dynamics::new(),
            interactions: Vec::new(),
            globals: Vec::new(),
            locals: Vec::new(),
            systems: Vec::new(),
            tickers: Vec::new(),
            scheduler: Scheduler::new(),
            system_time: 0.0,
            event_count: 0,
            rng,
            initialised: false,
        })
    }

    /// A periodic hard-sphere gas: non-overlapping particles placed by
    /// rejection sampling, velocities uniform in [-1, 1] per component,
    /// with a bulk hard-sphere interaction and neighbour-list cells.
    pub fn hard_sphere_gas(
        num_particles: usize,
        box_size: Vec3,
        diameter: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if num_particles == 0 {
            return Err(Error::InvalidParam("num_particles must be > 0".into()));
        }
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        let boundary = Boundary::new(BoundaryKind::Periodic, box_size)?;
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::seed_from_u64(rand::rng().random()),
        };

        let mut particles: Vec<Particle> = Vec::with_capacity(num_particles);
        let max_attempts = 1_000_000usize;
        let d2 = diameter * diameter;
        for id in 0..num_particles {
            let mut attempts = 0usize;
            let pos = loop {
                if attempts >= max_attempts {
                    return Err(Error::InvalidParam(format!(
                        "failed to place particle {id} without overlap; lower the density"
                    )));
                }
                attempts += 1;
                let cand = Vec3::new(
                    rng.random_range(-0.5 * box_size.x..0.5 * box_size.x),
                    rng.random_range(-0.5 * box_size.y..0.5 * box_size.y),
                    rng.random_range(-0.5 * box_size.z..0.5 * box_size.z),
                );
                let overlapping = particles.iter().any(|p| {
                    let (rij, _) =
                        boundary.separation(cand - p.pos, Vec3::zero(), 0.0);
                    rij.norm_sq() < d2
                });
                if !overlapping {
                    break cand;
                }
            };
            let vel = Vec3::new(
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
            );
            particles.push(Particle::new(id, pos, vel)?);
        }

        let mut sim = Self::new(particles, boundary, Properties::uniform(mass)?, seed)?;
        sim.rng = rng;
        sim.add_interaction(Box::new(HardSphere::new("bulk", diameter, 1.0)?));
        sim.add_global(Box::new(GCells::new("cells")));
        Ok(sim)
    }

    /// Resample all velocities from a Maxwell distribution at the given
    /// temperature and remove the net drift. Call before `initialise`.
    pub fn set_maxwell_velocities(&mut self, temperature: f64) -> Result<()> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(Error::InvalidParam(
                "temperature must be finite and > 0".into(),
            ));
        }
        for i in 0..self.particles.len() {
            let factor = (temperature / self.properties.mass(i)).sqrt();
            self.particles[i].vel = Vec3::new(
                self.rng.sample::<f64, _>(StandardNormal) * factor,
                self.rng.sample::<f64, _>(StandardNormal) * factor,
                self.rng.sample::<f64, _>(StandardNormal) * factor,
            );
        }
        let total_mass: f64 = (0..self.particles.len())
            .map(|i| self.properties.mass(i))
            .sum();
        let drift = self.momentum() / total_mass;
        for p in &mut self.particles {
            p.vel -= drift;
        }
        if self.initialised {
            self.initialise()?;
        }
        Ok(())
    }

    pub fn add_interaction(&mut self, interaction: Box<dyn Interaction>) {
        self.interactions.push(interaction);
    }

    pub fn add_global(&mut self, global: Box<dyn Global>) {
        self.globals.push(global);
    }

    pub fn add_local(&mut self, local: Box<dyn Local>) {
        self.locals.push(local);
    }

    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    pub fn add_ticker(&mut self, ticker: Box<dyn Ticker>) {
        self.tickers.push(ticker);
    }

    pub fn system_time(&self) -> f64 {
        self.system_time
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Largest interaction reach over all loaded interactions.
    pub fn max_int_dist(&self) -> f64 {
        self.interactions
            .iter()
            .map(|i| i.max_int_dist())
            .fold(0.0, f64::max)
    }

    /// Total kinetic energy, rotational contributions included.
    pub fn kinetic_energy(&self) -> f64 {
        let mut ke: f64 = self
            .particles
            .iter()
            .map(|p| p.kinetic_energy(self.properties.mass(p.id)))
            .sum();
        if self.dynamics.has_rotation() {
            for p in &self.particles {
                if let Some(rot) = self.dynamics.rot_data(p.id) {
                    ke += 0.5
                        * self.properties.inertia(p.id)
                        * rot.angular_velocity.norm_sq();
                }
            }
        }
        ke
    }

    /// Total linear momentum.
    pub fn momentum(&self) -> Vec3 {
        let mut total = Vec3::zero();
        for p in &self.particles {
            total += p.vel * self.properties.mass(p.id);
        }
        total
    }

    /// Instantaneous kinetic temperature, `sum(m v^2) / (3 N)`.
    pub fn kinetic_temperature(&self) -> f64 {
        let sum: f64 = self
            .particles
            .iter()
            .map(|p| self.properties.mass(p.id) * p.vel.norm_sq())
            .sum();
        sum / (3.0 * self.particles.len() as f64)
    }

    fn predict_ctx(&self) -> PredictCtx<'_> {
        PredictCtx {
            particles: &self.particles,
            boundary: &self.boundary,
            dynamics: &self.dynamics,
            properties: &self.properties,
            system_time: self.system_time,
        }
    }

    /// The interaction governing a pair. Interactions are consulted in
    /// registration order; the first one wins.
    fn interaction_for(&self, p1: usize, p2: usize) -> Result<usize> {
        if self.interactions.is_empty() {
            return Err(Error::Config(format!(
                "no interaction registered for particles {p1} and {p2}"
            )));
        }
        Ok(0)
    }

    fn neighbours_of(&self, pid: usize) -> Option<Vec<usize>> {
        self.globals.iter().find_map(|g| g.neighbours(pid))
    }

    fn neighbour_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.particles.len();
        let mut pairs = Vec::new();
        for id1 in 0..n {
            match self.neighbours_of(id1) {
                Some(nbs) => {
                    for id2 in nbs {
                        if id2 > id1 {
                            pairs.push((id1, id2));
                        }
                    }
                }
                None => {
                    for id2 in (id1 + 1)..n {
                        pairs.push((id1, id2));
                    }
                }
            }
        }
        pairs
    }

    /// Check interactions, locals and cell sizing, build capture maps, and
    /// construct the event queue. Also the place re-initialisation happens
    /// after external state changes.
    pub fn initialise(&mut self) -> Result<()> {
        // Rigid interactions need orientation state.
        if self.interactions.iter().any(|i| i.uses_rotation()) && !self.dynamics.has_rotation()
        {
            self.dynamics = Dynamics::with_rotation(self.particles.len());
        }

        let max_int_dist = self.max_int_dist();

        // Plugin initialisation: globals (cell grids), locals, systems.
        for gi in 0..self.globals.len() {
            let mut ctx = InitCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                properties: &self.properties,
                max_int_dist,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.globals[gi].initialise(&mut ctx)?;
        }
        for li in 0..self.locals.len() {
            let mut ctx = InitCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                properties: &self.properties,
                max_int_dist,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.locals[li].initialise(&mut ctx)?;
        }
        for si in 0..self.systems.len() {
            let mut ctx = InitCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                properties: &self.properties,
                max_int_dist,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.systems[si].initialise(&mut ctx)?;
        }

        // Capture maps: classify neighbour pairs, unless a loaded
        // configuration already restored the map.
        let pairs = self.neighbour_pairs();
        for ii in 0..self.interactions.len() {
            let already_loaded = self
                .interactions[ii]
                .capture_map()
                .map(|m| !m.is_empty())
                .unwrap_or(false);
            if already_loaded {
                continue;
            }
            for &(id1, id2) in &pairs {
                if self.interaction_for(id1, id2)? != ii {
                    continue;
                }
                let pctx = PredictCtx {
                    particles: &self.particles,
                    boundary: &self.boundary,
                    dynamics: &self.dynamics,
                    properties: &self.properties,
                    system_time: self.system_time,
                };
                self.interactions[ii].initialise_capture(&pctx, id1, id2);
            }
        }

        self.validate_configuration(&pairs)?;

        // Build the queue.
        self.scheduler.rebuild(self.particles.len());
        for pid in 0..self.particles.len() {
            self.add_events(pid)?;
        }
        self.rebuild_system_events()?;

        self.initialised = true;
        Ok(())
    }

    /// Advisory validation pass: report invalid pair and local states, the
    /// first hundred verbosely, the rest as a count.
    fn validate_configuration(&self, pairs: &[(usize, usize)]) -> Result<()> {
        let mut warnings = 0usize;

        for &(id1, id2) in pairs {
            if self.interactions.is_empty() {
                break;
            }
            let ii = self.interaction_for(id1, id2)?;
            let pctx = self.predict_ctx();
            if let Some(msg) = self.interactions[ii].validate_state(&pctx, id1, id2) {
                warnings += 1;
                if warnings <= 100 {
                    log::warn!("invalid state: {msg}");
                }
            }
        }

        for p in &self.particles {
            for local in &self.locals {
                if !local.is_interaction(p) {
                    continue;
                }
                let pctx = self.predict_ctx();
                if let Some(msg) = local.validate_state(&pctx, p.id) {
                    warnings += 1;
                    if warnings <= 100 {
                        log::warn!("invalid state: {msg}");
                    }
                }
            }
        }

        if warnings > 100 {
            log::warn!(
                "over 100 invalid-state warnings, further output was suppressed \
                 ({warnings} total)"
            );
        }
        Ok(())
    }

    /// Regenerate every scheduled event for a particle: stream it, then
    /// query globals, locals and all current neighbours.
    fn add_events(&mut self, pid: usize) -> Result<()> {
        self.dynamics.update_particle(
            &self.boundary,
            &mut self.particles[pid],
            self.system_time,
        );

        for gi in 0..self.globals.len() {
            if !self.globals[gi].is_interaction(&self.particles[pid]) {
                continue;
            }
            let pred = {
                let pctx = PredictCtx {
                    particles: &self.particles,
                    boundary: &self.boundary,
                    dynamics: &self.dynamics,
                    properties: &self.properties,
                    system_time: self.system_time,
                };
                self.globals[gi].get_event(&pctx, pid)?
            };
            // Infinite predictions (a sleeping particle's cell exit) are
            // not schedulable; the next full update re-queries them.
            if !pred.is_none() && pred.dt.is_finite() {
                self.scheduler
                    .push(Event::new(pred.dt, pred.kind, gi, NO_PARTICLE, 0)?, pid)?;
            }
        }

        for li in 0..self.locals.len() {
            if !self.locals[li].is_interaction(&self.particles[pid]) {
                continue;
            }
            let pred = {
                let pctx = PredictCtx {
                    particles: &self.particles,
                    boundary: &self.boundary,
                    dynamics: &self.dynamics,
                    properties: &self.properties,
                    system_time: self.system_time,
                };
                self.locals[li].get_event(&pctx, pid)?
            };
            if !pred.is_none() && pred.dt.is_finite() {
                self.scheduler
                    .push(Event::new(pred.dt, pred.kind, li, NO_PARTICLE, 0)?, pid)?;
            }
        }

        if !self.interactions.is_empty() {
            match self.neighbours_of(pid) {
                Some(ids) => {
                    for id2 in ids {
                        self.add_interaction_event(pid, id2)?;
                    }
                }
                None => {
                    for id2 in 0..self.particles.len() {
                        self.add_interaction_event(pid, id2)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Predict and schedule the next event between a pair, snapshotting
    /// the secondary's event counter for lazy deletion.
    fn add_interaction_event(&mut self, p1: usize, id2: usize) -> Result<()> {
        if p1 == id2 {
            return Ok(());
        }
        self.dynamics.update_particle(
            &self.boundary,
            &mut self.particles[id2],
            self.system_time,
        );
        let iid = self.interaction_for(p1, id2)?;
        let pred = {
            let pctx = PredictCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                dynamics: &self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
            };
            self.interactions[iid].get_event(&pctx, p1, id2)?
        };
        if pred.is_none() {
            return Ok(());
        }
        self.scheduler.push(
            Event::new(
                pred.dt,
                pred.kind,
                iid,
                id2,
                self.scheduler.event_count(id2),
            )?,
            p1,
        )
    }

    fn full_update(&mut self, pid: usize) -> Result<()> {
        self.scheduler.invalidate_events(pid);
        self.add_events(pid)
    }

    fn full_update_pair(&mut self, p1: usize, p2: usize) -> Result<()> {
        self.scheduler.invalidate_events(p1);
        self.scheduler.invalidate_events(p2);
        self.add_events(p1)?;
        self.add_events(p2)
    }

    /// Re-arm the system slot from every registered system's current dt.
    fn rebuild_system_events(&mut self) -> Result<()> {
        let slot = self.scheduler.system_slot();
        self.scheduler.clear_pel(slot);
        for (si, system) in self.systems.iter().enumerate() {
            let dt = system.dt(self.system_time);
            self.scheduler
                .push(Event::new(dt, system.event_kind(), si, NO_PARTICLE, 0)?, slot)?;
        }
        Ok(())
    }

    /// Process the single next event in the queue.
    pub fn run_next_event(&mut self) -> Result<()> {
        if !self.initialised {
            return Err(Error::InvalidParam(
                "initialise() must be called before running events".into(),
            ));
        }

        self.scheduler.lazy_deletion_cleanup()?;
        let (pid, event) = self.scheduler.next_event()?;

        match event.kind.class() {
            EventClass::Interaction => self.run_interaction_event(pid, event),
            EventClass::Local => self.run_local_event(pid, event),
            EventClass::Global => self.run_global_event(pid, event),
            EventClass::System => self.run_system_event(event),
            EventClass::Recalculate => self.full_update(pid),
            EventClass::None => Err(Error::EventExhaustion(format!(
                "a NONE event reached the top of the queue (slot {pid}) at t = {}",
                self.system_time
            ))),
        }
    }

    fn run_interaction_event(&mut self, p1: usize, event: Event) -> Result<()> {
        let p2 = event.p2;
        if !event.dt_raw().is_finite() {
            return Err(Error::Numeric(format!(
                "{:?} event time is not finite: dt = {}, particles {p1} and {p2}",
                event.kind,
                event.dt_raw()
            )));
        }

        // Consume the queue entry, then re-predict with current state to
        // see whether accumulated rounding changed the event order.
        self.scheduler.pop_next_event();
        self.scheduler.lazy_deletion_cleanup()?;

        self.dynamics.update_particle_pair(
            &self.boundary,
            &mut self.particles,
            p1,
            p2,
            self.system_time,
        );
        let iid = self.interaction_for(p1, p2)?;
        let fresh = {
            let pctx = PredictCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                dynamics: &self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
            };
            self.interactions[iid].get_event(&pctx, p1, p2)?
        };

        let (_, top) = self.scheduler.next_event()?;
        if fresh.is_none()
            || (fresh.dt > top.dt_raw() && self.scheduler.interaction_rejection_allowed())
        {
            // The refreshed prediction is no longer first: reject and let
            // the true next event run (the watchdog bounds these cycles).
            return self.full_update_pair(p1, p2);
        }
        self.scheduler.reset_interaction_rejections();

        if !fresh.dt.is_finite() {
            return Err(Error::Numeric(format!(
                "recalculated {:?} event time is not finite: particles {p1} and {p2}, \
                 interaction {}",
                fresh.kind,
                self.interactions[iid].name()
            )));
        }
        if fresh.dt < 0.0 {
            log::warn!(
                "negative time event: dt = {}, particles {p1} and {p2}",
                fresh.dt
            );
        }

        self.system_time += fresh.dt;
        self.scheduler.stream(fresh.dt);

        let data = {
            let mut ectx = EventCtx {
                particles: &mut self.particles,
                boundary: &self.boundary,
                dynamics: &mut self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.interactions[iid].run_event(&mut ectx, p1, p2, fresh.kind)?
        };
        if data.kind != EventKind::Virtual {
            self.event_count += 1;
        }

        for global in &mut self.globals {
            global.particles_updated(&self.particles, &data);
        }
        self.full_update_pair(p1, p2)
    }

    fn run_local_event(&mut self, pid: usize, event: Event) -> Result<()> {
        let lid = event.source;
        if !event.dt_raw().is_finite() {
            return Err(Error::Numeric(format!(
                "{:?} event time is not finite: dt = {}, particle {pid}, local {}",
                event.kind,
                event.dt_raw(),
                self.locals[lid].name()
            )));
        }

        self.scheduler.pop_next_event();
        self.scheduler.lazy_deletion_cleanup()?;

        self.dynamics.update_particle(
            &self.boundary,
            &mut self.particles[pid],
            self.system_time,
        );
        let fresh = {
            let pctx = PredictCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                dynamics: &self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
            };
            self.locals[lid].get_event(&pctx, pid)?
        };

        let (_, top) = self.scheduler.next_event()?;
        if fresh.is_none()
            || (fresh.dt > top.dt_raw() && self.scheduler.local_rejection_allowed())
        {
            return self.full_update(pid);
        }
        self.scheduler.reset_local_rejections();

        if !fresh.dt.is_finite() {
            return Err(Error::Numeric(format!(
                "recalculated {:?} event time is not finite: particle {pid}, local {}",
                fresh.kind,
                self.locals[lid].name()
            )));
        }
        self.system_time += fresh.dt;
        self.scheduler.stream(fresh.dt);

        {
            let mut ectx = EventCtx {
                particles: &mut self.particles,
                boundary: &self.boundary,
                dynamics: &mut self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.locals[lid].run_event(&mut ectx, pid, fresh.kind)?;
        }
        self.event_count += 1;
        self.full_update(pid)
    }

    fn run_global_event(&mut self, pid: usize, event: Event) -> Result<()> {
        let gid = event.source;
        let dt = event.dt_raw();
        if dt.is_nan() || dt == f64::INFINITY {
            return Err(Error::Numeric(format!(
                "{:?} event time is not finite: dt = {dt}, particle {pid}, global {}",
                event.kind,
                self.globals[gid].name()
            )));
        }

        if self.globals[gid].consumes_time() {
            let locdt = dt.max(0.0);
            self.system_time += locdt;
            self.scheduler.stream(locdt);
        } else {
            // Neighbour-list events run without streaming the system; the
            // entry is consumed and replaced by the callee's follow-up.
            self.scheduler.pop_next_event();
        }

        let action = {
            let mut ectx = EventCtx {
                particles: &mut self.particles,
                boundary: &self.boundary,
                dynamics: &mut self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.globals[gid].run_event(&mut ectx, pid, dt)?
        };

        match action {
            GlobalAction::CellTransition {
                replacement,
                new_neighbours,
            } => {
                for id2 in new_neighbours {
                    if id2 != pid {
                        self.add_interaction_event(pid, id2)?;
                    }
                }
                if !replacement.is_none() && replacement.dt.is_finite() {
                    self.scheduler.push(
                        Event::new(replacement.dt, replacement.kind, gid, NO_PARTICLE, 0)?,
                        pid,
                    )?;
                }
                Ok(())
            }
            GlobalAction::StateChange { data: _ } => {
                self.event_count += 1;
                self.full_update(pid)
            }
        }
    }

    fn run_system_event(&mut self, event: Event) -> Result<()> {
        let sid = event.source;
        let dt = event.dt_raw();
        // System events may request immediate processing with -inf; only
        // NaN and +inf are invalid.
        if dt.is_nan() || dt == f64::INFINITY {
            return Err(Error::Numeric(format!(
                "{:?} event time is not finite: dt = {dt}, system {}",
                event.kind,
                self.systems[sid].name()
            )));
        }
        let locdt = dt.max(0.0);
        self.system_time += locdt;
        self.scheduler.stream(locdt);

        let follow = {
            let mut ectx = EventCtx {
                particles: &mut self.particles,
                boundary: &self.boundary,
                dynamics: &mut self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
                rng: &mut self.rng,
            };
            self.systems[sid].run_event(&mut ectx, self.event_count)?
        };

        if follow.counts_event {
            self.event_count += 1;
        }
        if follow.run_tickers {
            for pid in 0..self.particles.len() {
                self.dynamics.update_particle(
                    &self.boundary,
                    &mut self.particles[pid],
                    self.system_time,
                );
            }
            let pctx = PredictCtx {
                particles: &self.particles,
                boundary: &self.boundary,
                dynamics: &self.dynamics,
                properties: &self.properties,
                system_time: self.system_time,
            };
            for ticker in &mut self.tickers {
                ticker.ticker(&pctx);
            }
        }
        if let Some(pid) = follow.full_update {
            self.full_update(pid)?;
        }
        // Saves the systems rebuilding themselves.
        self.rebuild_system_events()
    }

    /// Run until a termination condition is met. With an `end_time` the
    /// simulation is streamed exactly onto the limit once the next event
    /// lies beyond it; an exhausted queue (NONE at the top) is fatal here.
    pub fn run(&mut self, conditions: RunConditions) -> Result<()> {
        loop {
            if let Some(max) = conditions.max_events {
                if self.event_count >= max {
                    return Ok(());
                }
            }
            if let Some(end) = conditions.end_time {
                if self.system_time >= end {
                    return Ok(());
                }
                // Peek: cell transitions are processed without moving the
                // clock, so the end-of-run check must look at the queue,
                // not just the elapsed time.
                self.scheduler.lazy_deletion_cleanup()?;
                let (slot, event) = self.scheduler.next_event()?;
                if event.kind == EventKind::None {
                    return Err(Error::EventExhaustion(format!(
                        "a NONE event reached the top of the queue (slot {slot}) at t = {}",
                        self.system_time
                    )));
                }
                if self.system_time + event.dt_raw() > end {
                    let rem = end - self.system_time;
                    self.system_time = end;
                    self.scheduler.stream(rem);
                    return Ok(());
                }
            }
            self.run_next_event()?;
        }
    }

    /// Run until `n` more counted events (collisions, wall hits, state
    /// changes, thermostat kicks) have been processed.
    pub fn run_events(&mut self, n: u64) -> Result<()> {
        let target = self.event_count + n;
        while self.event_count < target {
            self.run_next_event()?;
        }
        Ok(())
    }

    /// Advance to an absolute time, processing every event before it and
    /// streaming the remainder. Unlike [`Simulation::run`], an exhausted
    /// queue just drifts the system to the target.
    pub fn advance_to(&mut self, target_time: f64) -> Result<()> {
        if !target_time.is_finite() {
            return Err(Error::InvalidParam("target_time must be finite".into()));
        }
        if target_time < self.system_time - EPS_TIME {
            return Err(Error::InvalidParam(
                "target_time cannot be earlier than the current time".into(),
            ));
        }
        if !self.initialised {
            self.initialise()?;
        }

        while self.system_time + EPS_TIME < target_time {
            self.scheduler.lazy_deletion_cleanup()?;
            let (_, event) = self.scheduler.next_event()?;
            if self.system_time + event.dt_raw() > target_time {
                let rem = target_time - self.system_time;
                self.system_time = target_time;
                self.scheduler.stream(rem);
                break;
            }
            self.run_next_event()?;
        }
        Ok(())
    }

    /// Stream every particle to the current system time (for observation).
    pub fn update_all_particles(&mut self) {
        for pid in 0..self.particles.len() {
            self.dynamics.update_particle(
                &self.boundary,
                &mut self.particles[pid],
                self.system_time,
            );
        }
    }
}
