//! The future event list: an indexed min-heap over per-particle event
//! lists, keyed by each list's soonest time.
//!
//! Stored times are rebased to a common origin (`pec_time`): pushing adds
//! the current origin, [`Fel::stream`] advances the origin in O(1), and
//! [`Fel::next`] subtracts it back out. The slot at index N (one past the
//! last particle) holds system events.

use crate::core::event::{Event, EventKind};
use crate::core::pel::Pel;
use crate::error::{Error, Result};
use ordered_float::NotNan;

#[derive(Debug, Default)]
pub struct Fel {
    pels: Vec<Pel>,
    /// Heap of slot indices; `heap[0]` owns the globally soonest event.
    heap: Vec<usize>,
    /// Slot index -> heap position.
    pos: Vec<usize>,
    pec_time: f64,
}

impl Fel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to `n_slots` empty slots and a zero origin offset.
    pub fn resize(&mut self, n_slots: usize) {
        self.pels = vec![Pel::new(); n_slots];
        self.heap = (0..n_slots).collect();
        self.pos = (0..n_slots).collect();
        self.pec_time = 0.0;
    }

    pub fn len(&self) -> usize {
        self.pels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pels.is_empty()
    }

    /// Advance the common time origin; stored events do not move.
    #[inline]
    pub fn stream(&mut self, dt: f64) {
        self.pec_time += dt;
    }

    /// Insert an event (with `dt` measured from now) into a slot's list.
    pub fn push(&mut self, event: Event, slot: usize) -> Result<()> {
        let rebased = NotNan::new(event.dt.into_inner() + self.pec_time).map_err(|_| {
            Error::Numeric(format!(
                "NaN rebased event time for {:?} event in slot {slot}",
                event.kind
            ))
        })?;
        let mut stored = event;
        stored.dt = rebased;
        self.pels[slot].push(stored);
        self.update(slot);
        Ok(())
    }

    /// Drop every event in a slot.
    pub fn clear_pel(&mut self, slot: usize) {
        self.pels[slot].clear();
        self.update(slot);
    }

    /// The soonest event over all slots, with its time rebased to "from
    /// now", along with the owning slot.
    pub fn next(&self) -> Result<(usize, Event)> {
        let slot = *self.heap.first().ok_or_else(|| {
            Error::EventExhaustion("the future event list has no slots".into())
        })?;
        let mut event = *self.pels[slot].top();
        let rel = event.dt.into_inner() - self.pec_time;
        event.dt = NotNan::new(rel)
            .map_err(|_| Error::Numeric("NaN relative event time at queue top".into()))?;
        Ok((slot, event))
    }

    /// Consume the top slot's stored event, leaving its RECALCULATE marker.
    pub fn pop_next_event(&mut self) {
        if let Some(&slot) = self.heap.first() {
            self.pels[slot].pop();
            self.update(slot);
        }
    }

    /// Restore heap order for a slot whose list changed.
    pub fn update(&mut self, slot: usize) {
        let at = self.pos[slot];
        if !self.sift_up(at) {
            self.sift_down(at);
        }
    }

    /// True when the top of the queue is a NONE event (nothing scheduled).
    pub fn exhausted(&self) -> bool {
        match self.heap.first() {
            Some(&slot) => self.pels[slot].top().kind == EventKind::None,
            None => true,
        }
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        // Slot index breaks exact ties so the order is total.
        let (ea, eb) = (self.pels[a].top(), self.pels[b].top());
        (ea, a) < (eb, b)
    }

    #[inline]
    fn swap_heap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.pos[self.heap[i]] = i;
        self.pos[self.heap[j]] = j;
    }

    fn sift_up(&mut self, mut at: usize) -> bool {
        let mut moved = false;
        while at > 0 {
            let parent = (at - 1) / 2;
            if self.less(self.heap[at], self.heap[parent]) {
                self.swap_heap(at, parent);
                at = parent;
                moved = true;
            } else {
                break;
            }
        }
        moved
    }

    fn sift_down(&mut self, mut at: usize) {
        let n = self.heap.len();
        loop {
            let (l, r) = (2 * at + 1, 2 * at + 2);
            let mut smallest = at;
            if l < n && self.less(self.heap[l], self.heap[smallest]) {
                smallest = l;
            }
            if r < n && self.less(self.heap[r], self.heap[smallest]) {
                smallest = r;
            }
            if smallest == at {
                break;
            }
            self.swap_heap(at, smallest);
            at = smallest;
        }
    }
}
