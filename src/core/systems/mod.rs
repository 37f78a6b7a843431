//! System events: scheduled whole-system actions (thermostats, tickers)
//! living in the queue slot one past the last particle.

mod andersen;
mod ticker;

pub use andersen::AndersenThermostat;
pub use ticker::SysTicker;

use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::event::{EventKind, ParticleEventData};
use crate::error::Result;
use crate::io::XmlNode;

/// Follow-up work after a system event executed.
pub struct SystemFollowUp {
    pub data: Option<ParticleEventData>,
    /// A particle whose events must be fully regenerated.
    pub full_update: Option<usize>,
    /// Stream every particle and invoke the registered tickers.
    pub run_tickers: bool,
    /// Whether the event counts toward the processed-event total.
    pub counts_event: bool,
}

pub trait System {
    fn name(&self) -> &str;

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()>;

    /// The kind this system's events are scheduled under.
    fn event_kind(&self) -> EventKind {
        EventKind::Gaussian
    }

    /// Time from `now` until this system's next event.
    fn dt(&self, now: f64) -> f64;

    fn run_event(&mut self, ctx: &mut EventCtx<'_>, total_events: u64)
        -> Result<SystemFollowUp>;

    fn output_xml(&self) -> XmlNode;
}

/// Output seam invoked by the ticker system event. Full output plugins
/// live outside the core; anything implementing this trait can observe the
/// streamed particle states at a fixed period.
pub trait Ticker {
    fn name(&self) -> &str;

    fn ticker(&mut self, ctx: &PredictCtx<'_>);
}
