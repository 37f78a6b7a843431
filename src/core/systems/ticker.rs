use crate::core::context::{EventCtx, InitCtx};
use crate::core::systems::{System, SystemFollowUp};
use crate::error::{Error, Result};
use crate::io::XmlNode;

/// Fixed-period pulse that streams every particle and hands control to the
/// registered tickers (trajectory writers, measurement probes).
#[derive(Debug)]
pub struct SysTicker {
    name: String,
    period: f64,
    next_time: f64,
}

impl SysTicker {
    pub fn new(name: impl Into<String>, period: f64) -> Result<Self> {
        if !period.is_finite() || period <= 0.0 {
            return Err(Error::InvalidParam(
                "ticker period must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            period,
            next_time: f64::INFINITY,
        })
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Change the period; takes effect from the next pulse.
    pub fn set_period(&mut self, period: f64, now: f64) -> Result<()> {
        if !period.is_finite() || period <= 0.0 {
            return Err(Error::InvalidParam(
                "ticker period must be finite and > 0".into(),
            ));
        }
        self.period = period;
        self.next_time = now + period;
        Ok(())
    }
}

impl System for SysTicker {
    fn name(&self) -> &str {
        &self.name
    }

    fn event_kind(&self) -> crate::core::event::EventKind {
        crate::core::event::EventKind::Ticker
    }

    fn initialise(&mut self, ctx: &mut InitCtx<'_>) -> Result<()> {
        self.next_time = ctx.system_time + self.period;
        Ok(())
    }

    fn dt(&self, now: f64) -> f64 {
        self.next_time - now
    }

    fn run_event(
        &mut self,
        _ctx: &mut EventCtx<'_>,
        _total_events: u64,
    ) -> Result<SystemFollowUp> {
        // Drift-free cadence: advance from the scheduled time, not from
        // the (identical up to rounding) clock.
        self.next_time += self.period;
        Ok(SystemFollowUp {
            data: None,
            full_update: None,
            run_tickers: true,
            counts_event: false,
        })
    }

    fn output_xml(&self) -> XmlNode {
        XmlNode::new("System")
            .attr("Type", "Ticker")
            .attr("Name", &self.name)
            .attr("Period", self.period)
    }
}
