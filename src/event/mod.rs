//! An `EventHandler` trait plus the small set of concrete sinks shipped
//! as reference implementations of the external "Event Handlers"
//! interface.

pub mod registry;
pub mod sinks;

use std::rc::Rc;

use crate::atom::LogAtom;

/// One anomaly (or report) event, handed to every configured sink.
#[derive(Debug, Clone)]
pub struct AnomalyEvent {
    /// `"Analysis.<DetectorName>"`.
    pub source: String,
    pub message: String,
    pub sorted_log_lines: Vec<String>,
    /// Always carries an `AnalysisComponent` subdocument; reports add
    /// `FromTime`/`ToTime`.
    pub event_data: serde_json::Value,
    pub log_atom: Option<LogAtom>,
    pub detector_name: String,
}

pub trait EventHandler {
    fn receive_event(&self, event: &AnomalyEvent);
}

/// Fans one event out to every registered sink. `receive_event` itself
/// does not return a `Result`, so sinks that can fail (file I/O) must
/// swallow and log their own errors, which `sinks::FileSink`/`JsonLinesSink`
/// do — a broken sink never tears down the others.
pub struct EventBus {
    handlers: Vec<Rc<dyn EventHandler>>,
}

impl EventBus {
    pub fn new(handlers: Vec<Rc<dyn EventHandler>>) -> Self {
        EventBus { handlers }
    }

    pub fn emit(&self, event: AnomalyEvent) {
        for handler in &self.handlers {
            handler.receive_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingHandler(RefCell<Vec<String>>);

    impl EventHandler for RecordingHandler {
        fn receive_event(&self, event: &AnomalyEvent) {
            self.0.borrow_mut().push(event.message.clone());
        }
    }

    #[test]
    fn bus_fans_out_to_every_handler() {
        let a = Rc::new(RecordingHandler(RefCell::new(Vec::new())));
        let b = Rc::new(RecordingHandler(RefCell::new(Vec::new())));
        let bus = EventBus::new(vec![a.clone(), b.clone()]);
        bus.emit(AnomalyEvent {
            source: "Analysis.Test".to_string(),
            message: "hello".to_string(),
            sorted_log_lines: vec![],
            event_data: serde_json::json!({}),
            log_atom: None,
            detector_name: "Test".to_string(),
        });
        assert_eq!(a.0.borrow().as_slice(), ["hello"]);
        assert_eq!(b.0.borrow().as_slice(), ["hello"]);
    }
}
