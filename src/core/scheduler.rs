//! The scheduler's bookkeeping: the future event list, per-particle event
//! counters for lazy deletion, and the rejection watchdogs.
//!
//! The orchestration itself (pop, re-predict, execute, refresh) lives on
//! [`crate::core::sim::Simulation`], which owns every collaborator the
//! event dispatch needs.

use crate::core::event::{Event, EventClass};
use crate::core::fel::Fel;
use crate::error::Result;

/// Consecutive re-prediction rejections tolerated before the queue top is
/// forced through; bounds the cost of floating-point tie cycles.
pub const REJECTION_LIMIT: u32 = 10;

#[derive(Debug, Default)]
pub struct Scheduler {
    fel: Fel,
    /// Incremented whenever a particle's pending events are invalidated;
    /// interaction events snapshot their secondary's count and are
    /// discarded on pop when the counts no longer match.
    event_count: Vec<u64>,
    interaction_rejections: u32,
    local_rejections: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for `n_particles` particles plus the system slot.
    pub fn rebuild(&mut self, n_particles: usize) {
        self.fel.resize(n_particles + 1);
        self.event_count = vec![0; n_particles + 1];
        self.interaction_rejections = 0;
        self.local_rejections = 0;
    }

    /// The slot holding system events.
    #[inline]
    pub fn system_slot(&self) -> usize {
        self.event_count.len().saturating_sub(1)
    }

    #[inline]
    pub fn event_count(&self, pid: usize) -> u64 {
        self.event_count[pid]
    }

    /// Invalidate a particle's scheduled events: bump its counter so
    /// foreign references go stale, and drop its own list.
    pub fn invalidate_events(&mut self, pid: usize) {
        self.event_count[pid] += 1;
        self.fel.clear_pel(pid);
    }

    pub fn push(&mut self, event: Event, slot: usize) -> Result<()> {
        self.fel.push(event, slot)
    }

    pub fn clear_pel(&mut self, slot: usize) {
        self.fel.clear_pel(slot);
    }

    pub fn stream(&mut self, dt: f64) {
        self.fel.stream(dt);
    }

    pub fn next_event(&self) -> Result<(usize, Event)> {
        self.fel.next()
    }

    pub fn pop_next_event(&mut self) {
        self.fel.pop_next_event();
    }

    pub fn exhausted(&self) -> bool {
        self.fel.exhausted()
    }

    /// Pop stale interaction events off the top of the queue: any whose
    /// secondary-particle counter snapshot no longer matches.
    pub fn lazy_deletion_cleanup(&mut self) -> Result<()> {
        loop {
            let (_, event) = self.fel.next()?;
            let stale = event.kind.class() == EventClass::Interaction
                && event.coll_counter2 != self.event_count[event.p2];
            if !stale {
                return Ok(());
            }
            self.fel.pop_next_event();
        }
    }

    /// Record an interaction re-prediction rejection; true while the
    /// watchdog still allows rejecting.
    pub fn interaction_rejection_allowed(&mut self) -> bool {
        self.interaction_rejections += 1;
        self.interaction_rejections < REJECTION_LIMIT
    }

    pub fn reset_interaction_rejections(&mut self) {
        self.interaction_rejections = 0;
    }

    /// Record a local re-prediction rejection; true while the watchdog
    /// still allows rejecting.
    pub fn local_rejection_allowed(&mut self) -> bool {
        self.local_rejections += 1;
        self.local_rejections < REJECTION_LIMIT
    }

    pub fn reset_local_rejections(&mut self) {
        self.local_rejections = 0;
    }
}
