use crate::core::context::{EventCtx, InitCtx};
use crate::core::ranges::IdRange;
use crate::core::systems::{System, SystemFollowUp};
use crate::error::{Error, Result};
use crate::io::XmlNode;
use rand::Rng;

/// Andersen "ghost collision" thermostat.
///
/// Fires after exponentially distributed waits; each firing resamples one
/// uniformly chosen particle's velocity from a Maxwell distribution at the
/// target temperature. With tuning enabled the mean free time is rescaled
/// every `set_frequency` ghost events so ghost collisions stay near the
/// `set_point` fraction of all events.
#[derive(Debug)]
pub struct AndersenThermostat {
    name: String,
    range: IdRange,
    /// Mean free time per particle, as configured; divided by N at
    /// initialisation.
    mean_free_time: f64,
    temperature: f64,
    sqrt_temp: f64,
    tune: bool,
    set_point: f64,
    set_frequency: u64,
    ghost_events: u64,
    last_total_events: u64,
    next_time: f64,
    n_particles: usize,
}

impl AndersenThermostat {
    pub fn new(
        name: impl Into<String>,
        range: IdRange,
        mean_free_time: f64,
        temperature: f64,
    ) -> Result<Self> {
        if !mean_free_time.is_finite() || mean_free_time <= 0.0 {
            return Err(Error::InvalidParam(
                "thermostat mean free time must be finite and > 0".into(),
            ));
        }
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(Error::InvalidParam(
                "thermostat temperature must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            range,
            mean_free_time,
            temperature,
            sqrt_temp: temperature.sqrt(),
            tune: false,
            set_point: 0.05,
            set_frequency: 100,
            ghost_events: 0,
            last_total_events: 0,
            next_time: f64::INFINITY,
            n_particles: 0,
        })
    }

    /// Enable mean-free-time tuning toward a ghost-collision fraction.
    pub fn with_tuning(mut self, set_point: f64, set_frequency: u64) -> Self {
        self.tune = true;
        self.set_point = set_point;
        self.set_frequency = set_frequency.max(1);
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn mean_free_time(&self) -> f64 {
        self.mean_free_time
    }

    fn sample_wait(&self, rng: &mut rand::rngs::StdRng) -> f64 {
        -self.mean_free_time * (1.0 - rng.random::<f64>()).ln()
    }
}

impl System for AndersenThermostat {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()> {
        self.n_particles = ctx.particles.len();
        if self.range.is_empty(self.n_particles) {
            return Err(Error::Config(format!(
                "thermostat {} has an empty particle range",
                self.name
            )));
        }
        self.mean_free_time /= self.n_particles as f64;
        self.sqrt_temp = self.temperature.sqrt();
        self.next_time = ctx.system_time + self.sample_wait(ctx.rng);
        Ok(())
    }

    fn dt(&self, now: f64) -> f64 {
        self.next_time - now
    }

    fn run_event(
        &mut self,
        ctx: &mut EventCtx<'_>,
        total_events: u64,
    ) -> Result<SystemFollowUp> {
        self.ghost_events += 1;
        if self.tune && self.ghost_events > self.set_frequency {
            let window = (total_events - self.last_total_events).max(1);
            self.mean_free_time *=
                self.ghost_events as f64 / (window as f64 * self.set_point);
            self.last_total_events = total_events;
            self.ghost_events = 0;
        }

        self.next_time = ctx.system_time + self.sample_wait(ctx.rng);

        let pick = ctx.rng.random_range(0..self.range.len(ctx.particles.len()));
        let pid = self.range.nth(pick);
        if !ctx.particles[pid].is_dynamic() {
            // Ghost collisions act on moving particles; sleeping ones are
            // left to the wakeup rules.
            return Ok(SystemFollowUp {
                data: None,
                full_update: None,
                run_tickers: false,
                counts_event: false,
            });
        }
        let data = ctx.dynamics.random_gaussian_event(
            ctx.boundary,
            ctx.properties,
            &mut ctx.particles[pid],
            ctx.system_time,
            self.sqrt_temp,
            ctx.rng,
        );

        Ok(SystemFollowUp {
            data: Some(data),
            full_update: Some(pid),
            run_tickers: false,
            counts_event: true,
        })
    }

    fn output_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("System")
            .attr("Type", "Andersen")
            .attr("Name", &self.name)
            .attr(
                "MFT",
                self.mean_free_time * self.n_particles.max(1) as f64,
            )
            .attr("Temperature", self.temperature);
        if self.tune {
            node = node
                .attr("SetPoint", self.set_point)
                .attr("SetFrequency", self.set_frequency);
        }
        node
    }
}
