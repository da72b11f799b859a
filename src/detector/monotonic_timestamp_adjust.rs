//! `MonotonicTimestampAdjust`: not a detector, a transformer placed in
//! the dispatch chain that rewrites each atom's timestamp to
//! `max(atom.timestamp, last_out)` before forwarding, enforcing
//! monotonicity for everything downstream of it.

use std::cell::Cell;

use crate::atom::LogAtom;
use crate::dispatch::AtomHandler;
use crate::event::EventBus;

pub struct MonotonicTimestampAdjust<H> {
    last_out: Cell<Option<f64>>,
    inner: H,
}

impl<H: AtomHandler> MonotonicTimestampAdjust<H> {
    pub fn new(inner: H) -> Self {
        MonotonicTimestampAdjust { last_out: Cell::new(None), inner }
    }
}

impl<H: AtomHandler> AtomHandler for MonotonicTimestampAdjust<H> {
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool {
        let Some(observed) = atom.timestamp else {
            return self.inner.receive_atom(atom, bus);
        };
        let adjusted = match self.last_out.get() {
            Some(last) if observed < last => last,
            _ => observed,
        };
        self.last_out.set(Some(adjusted));
        let forwarded = atom.with_timestamp(Some(adjusted));
        self.inner.receive_atom(&forwarded, bus)
    }
}
