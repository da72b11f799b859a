//! The Dispatch Fabric: fan-out and filter chain delivering atoms to
//! handlers. Walked synchronously in registration order — no channel
//! fan-out here; suspension points only exist at true I/O boundaries
//! (source read, sink write, persistence write), never inside dispatch
//! itself.

use std::cell::RefCell;
use std::rc::Rc;

use crate::atom::LogAtom;
use crate::event::EventBus;

/// Anything that can receive an atom during dispatch: a detector, or a
/// transformer such as `MonotonicTimestampAdjust` that forwards to an
/// inner handler after rewriting the atom.
pub trait AtomHandler {
    /// Returns whether this handler "handled" the atom. This is a
    /// handled/not-handled signal, not anomaly/not-anomaly.
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool;
}

impl<T: AtomHandler + ?Sized> AtomHandler for Rc<T> {
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool {
        (**self).receive_atom(atom, bus)
    }
}

impl<T: AtomHandler + ?Sized> AtomHandler for Box<T> {
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool {
        (**self).receive_atom(atom, bus)
    }
}

/// Wraps any `crate::detector::Detector` behind interior mutability so it
/// can sit in a `Vec<Box<dyn AtomHandler>>` alongside transformers while
/// the pipeline keeps its own `Rc` clone for time-trigger/persistence
/// access.
pub struct DetectorHandle(pub Rc<RefCell<dyn crate::detector::Detector>>);

impl AtomHandler for DetectorHandle {
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.0.borrow_mut().receive_atom(atom, bus)
    }
}

/// An ordered list of handlers with an optional "stop after first match"
/// flag.
pub struct SubhandlerFilter {
    handlers: Vec<Box<dyn AtomHandler>>,
    stop_after_first_match: bool,
}

impl SubhandlerFilter {
    pub fn new(handlers: Vec<Box<dyn AtomHandler>>, stop_after_first_match: bool) -> Self {
        SubhandlerFilter { handlers, stop_after_first_match }
    }
}

impl AtomHandler for SubhandlerFilter {
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool {
        let mut handled = false;
        for handler in &self.handlers {
            if handler.receive_atom(atom, bus) {
                handled = true;
                if self.stop_after_first_match {
                    break;
                }
            }
        }
        handled
    }
}

/// Restricts delivery to atoms whose Match Tree contains `path`, and
/// optionally matches `value` at that path.
pub struct MatchFilter {
    path: String,
    value: Option<String>,
    inner: Box<dyn AtomHandler>,
}

impl MatchFilter {
    pub fn new(path: impl Into<String>, value: Option<String>, inner: Box<dyn AtomHandler>) -> Self {
        MatchFilter { path: path.into(), value, inner }
    }
}

impl AtomHandler for MatchFilter {
    fn receive_atom(&self, atom: &LogAtom, bus: &EventBus) -> bool {
        let Some(tree) = atom.match_tree.as_ref() else {
            return false;
        };
        let Some(matched) = tree.get(&self.path) else {
            return false;
        };
        if let Some(expected) = &self.value {
            if matched.first().value.display_string() != *expected {
                return false;
            }
        }
        self.inner.receive_atom(atom, bus)
    }
}
