use crate::core::event::{Event, EventKind};
use ordered_float::NotNan;

/// A single-slot per-particle event list.
///
/// Stores only the soonest known event for its particle. Pushing keeps the
/// minimum; popping leaves a RECALCULATE marker at the consumed time so the
/// scheduler regenerates the particle's events when the marker surfaces.
#[derive(Debug, Clone)]
pub struct Pel {
    event: Event,
}

impl Default for Pel {
    fn default() -> Self {
        Self::new()
    }
}

impl Pel {
    pub fn new() -> Self {
        Self {
            event: Event::none(),
        }
    }

    #[inline]
    pub fn push(&mut self, event: Event) {
        if event < self.event {
            self.event = event;
        }
    }

    #[inline]
    pub fn top(&self) -> &Event {
        &self.event
    }

    /// Consume the stored event, leaving a recalculation marker.
    #[inline]
    pub fn pop(&mut self) {
        if self.event.kind != EventKind::None {
            self.event.kind = EventKind::Recalculate;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.event = Event::none();
    }

    #[inline]
    pub fn dt(&self) -> NotNan<f64> {
        self.event.dt
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.event.kind == EventKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::NO_PARTICLE;

    #[test]
    fn push_keeps_the_minimum() {
        let mut pel = Pel::new();
        pel.push(Event::new(5.0, EventKind::Cell, 0, NO_PARTICLE, 0).unwrap());
        pel.push(Event::new(2.0, EventKind::Core, 0, 7, 3).unwrap());
        pel.push(Event::new(9.0, EventKind::Wall, 1, NO_PARTICLE, 0).unwrap());
        assert_eq!(pel.top().kind, EventKind::Core);
        assert_eq!(pel.dt().into_inner(), 2.0);
    }

    #[test]
    fn pop_leaves_recalculate_at_same_time() {
        let mut pel = Pel::new();
        pel.push(Event::new(2.0, EventKind::Core, 0, 7, 3).unwrap());
        pel.pop();
        assert_eq!(pel.top().kind, EventKind::Recalculate);
        assert_eq!(pel.dt().into_inner(), 2.0);
    }

    #[test]
    fn pop_of_empty_slot_stays_none() {
        let mut pel = Pel::new();
        pel.pop();
        assert!(pel.is_empty());
    }

    #[test]
    fn clear_resets_to_infinity() {
        let mut pel = Pel::new();
        pel.push(Event::new(2.0, EventKind::Core, 0, 7, 3).unwrap());
        pel.clear();
        assert!(pel.is_empty());
        assert!(pel.dt().into_inner().is_infinite());
    }
}
