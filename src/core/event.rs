use crate::core::math::Vec3;
use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// Every event kind the engine can schedule or report.
///
/// The kind determines both the physics of the event and, through
/// [`EventKind::class`], which dispatch path the scheduler takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// No event; a NONE at the top of the queue is fatal.
    None,
    /// Hard-core collision between two particles.
    Core,
    /// Inner turn-around inside a well when the pair lacks the energy to
    /// cross the outer shell.
    Bounce,
    /// Crossing the outer shell of a well, gaining kinetic energy.
    WellKeUp,
    /// Crossing the outer shell of a well, losing kinetic energy.
    WellKeDown,
    /// Entry into a capture radius; updates the capture map, no impulse.
    NbhoodIn,
    /// Exit from a capture radius; updates the capture map, no impulse.
    NbhoodOut,
    /// Refresh-only event: re-predict without touching the particles.
    Virtual,
    /// A popped single-slot queue entry; forces a full re-prediction of the
    /// owner's events when it surfaces.
    Recalculate,
    /// Cell-boundary crossing in a neighbour-list grid.
    Cell,
    /// Collision with a planar wall.
    Wall,
    /// Thermostat velocity resample.
    Gaussian,
    /// Periodic ticker pulse.
    Ticker,
    /// A particle leaves the dynamic set.
    Sleep,
    /// A sleeping particle rejoins the dynamic set.
    Wakeup,
}

/// Dispatch class of an event: which owner executes it and whether the
/// scheduler re-predicts, pops and streams (see the scheduler main loop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Interaction,
    Global,
    Local,
    System,
    Recalculate,
    None,
}

impl EventKind {
    pub fn class(&self) -> EventClass {
        use EventKind::*;
        match self {
            Core | Bounce | WellKeUp | WellKeDown | NbhoodIn | NbhoodOut | Virtual => {
                EventClass::Interaction
            }
            Cell | Sleep | Wakeup => EventClass::Global,
            Wall => EventClass::Local,
            Gaussian | Ticker => EventClass::System,
            Recalculate => EventClass::Recalculate,
            None => EventClass::None,
        }
    }
}

/// A plugin's answer to "when is your next event for these participants".
///
/// `dt` is measured from the current system time. A `kind` of
/// [`EventKind::None`] means no event (`dt` is then infinite).
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub dt: f64,
    pub kind: EventKind,
}

impl Prediction {
    pub fn new(dt: f64, kind: EventKind) -> Self {
        Self { dt, kind }
    }

    pub fn none() -> Self {
        Self {
            dt: f64::INFINITY,
            kind: EventKind::None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == EventKind::None
    }
}

/// A scheduled event held in a particle's queue slot.
///
/// - `dt`: time of the event, rebased to the queue's common origin
/// - `source`: index of the owning interaction/global/local/system
/// - `p2`: secondary particle for pair events, `usize::MAX` otherwise
/// - `coll_counter2`: snapshot of the secondary particle's event count at
///   prediction time, used for lazy deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub dt: NotNan<f64>,
    pub kind: EventKind,
    pub source: usize,
    pub p2: usize,
    pub coll_counter2: u64,
}

pub const NO_PARTICLE: usize = usize::MAX;

impl Event {
    /// Build an event, rejecting NaN times. Infinite times are permitted;
    /// they simply never reach the top of the queue.
    pub fn new(
        dt: f64,
        kind: EventKind,
        source: usize,
        p2: usize,
        coll_counter2: u64,
    ) -> Result<Self> {
        let dt = NotNan::new(dt).map_err(|_| {
            Error::Numeric(format!(
                "NaN event time for {kind:?} event (source {source}, secondary {p2})"
            ))
        })?;
        Ok(Self {
            dt,
            kind,
            source,
            p2,
            coll_counter2,
        })
    }

    /// The empty slot: a NONE event at infinite time.
    pub fn none() -> Self {
        Self {
            dt: NotNan::new(f64::INFINITY).unwrap_or_else(|_| unreachable!()),
            kind: EventKind::None,
            source: 0,
            p2: NO_PARTICLE,
            coll_counter2: 0,
        }
    }

    #[inline]
    pub fn dt_raw(&self) -> f64 {
        self.dt.into_inner()
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Deterministic total order: time first, then kind/participants so
        // simultaneous events resolve identically run to run.
        self.dt
            .cmp(&other.dt)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| (self.source, self.p2).cmp(&(other.source, other.p2)))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of a pair event, consumed by diagnostics and the sleep rule.
#[derive(Debug, Clone, Copy)]
pub struct PairEventData {
    pub p1: usize,
    pub p2: usize,
    pub kind: EventKind,
    /// Separation vector at contact (minimum image).
    pub rij: Vec3,
    /// Momentum transferred from p1 to p2.
    pub impulse: Vec3,
    pub delta_ke: f64,
    /// Change in internal (potential) energy, nonzero for well crossings.
    pub delta_u: f64,
}

/// Outcome of a single-particle event (wall, thermostat, sleep).
#[derive(Debug, Clone, Copy)]
pub struct ParticleEventData {
    pub particle: usize,
    pub kind: EventKind,
    pub delta_ke: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_time_rejected() {
        let err = Event::new(f64::NAN, EventKind::Core, 0, 1, 0).unwrap_err();
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn infinite_time_allowed() -> Result<()> {
        let e = Event::new(f64::INFINITY, EventKind::Cell, 0, NO_PARTICLE, 0)?;
        assert!(e.dt_raw().is_infinite());
        Ok(())
    }

    #[test]
    fn ordering_by_time_then_kind() -> Result<()> {
        let a = Event::new(1.0, EventKind::Core, 0, 1, 0)?;
        let b = Event::new(2.0, EventKind::Wall, 0, NO_PARTICLE, 0)?;
        assert!(a < b);
        let c = Event::new(1.0, EventKind::Wall, 0, NO_PARTICLE, 0)?;
        // Equal times resolve by kind, deterministically.
        assert!(a < c);
        Ok(())
    }

    #[test]
    fn class_mapping() {
        assert_eq!(EventKind::Core.class(), EventClass::Interaction);
        assert_eq!(EventKind::NbhoodOut.class(), EventClass::Interaction);
        assert_eq!(EventKind::Cell.class(), EventClass::Global);
        assert_eq!(EventKind::Wall.class(), EventClass::Local);
        assert_eq!(EventKind::Gaussian.class(), EventClass::System);
        assert_eq!(EventKind::Recalculate.class(), EventClass::Recalculate);
    }

    #[test]
    fn none_event_is_last() -> Result<()> {
        let none = Event::none();
        let real = Event::new(1e12, EventKind::Core, 0, 1, 0)?;
        assert!(real < none);
        Ok(())
    }
}
