//! `NewMatchPathDetector`: emits when an atom's Match Tree contains a
//! path never seen before. Persists the set of seen paths so learning
//! survives restarts.

use std::collections::BTreeSet;

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, LearnMode};

pub struct NewMatchPathDetector {
    name: String,
    persistence_key: String,
    known_paths: BTreeSet<String>,
    learn_mode: LearnMode,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl NewMatchPathDetector {
    pub fn new(name: String, persistence_id: String, output_logline: bool, learn_mode: bool, stop_learning_time: Option<f64>, stop_learning_no_anomaly_time: Option<f64>) -> Self {
        NewMatchPathDetector {
            persistence_key: crate::persistence::persistence_key("NewMatchPathDetector", &persistence_id),
            name,
            known_paths: BTreeSet::new(),
            learn_mode: LearnMode::new(learn_mode, stop_learning_time, stop_learning_no_anomaly_time),
            output_logline,
            log_success: 0,
            log_total: 0,
        }
    }
}

impl Detector for NewMatchPathDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        self.learn_mode.observe(atom.timestamp);
        let Some(tree) = atom.match_tree.as_ref() else { return false };

        let mut new_paths = Vec::new();
        for path in tree.keys() {
            if !self.known_paths.contains(path) {
                new_paths.push(path.to_string());
            }
        }
        if new_paths.is_empty() {
            self.log_success += 1;
            return true;
        }

        let data = atom.raw_text_lossy().into_owned();
        let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
        bus.emit(AnomalyEvent {
            source: format!("Analysis.{}", self.name),
            message: "New path(s) detected".to_string(),
            sorted_log_lines,
            event_data: serde_json::json!({
                "AnalysisComponent": { "AffectedLogAtomPaths": new_paths }
            }),
            log_atom: Some(atom.clone()),
            detector_name: self.name.clone(),
        });

        if self.learn_mode.is_learning() {
            for path in tree.keys() {
                self.known_paths.insert(path.to_string());
            }
        }
        self.log_success += 1;
        true
    }

    fn log_statistics(&mut self) -> (u64, u64) {
        let stats = (self.log_success, self.log_total);
        self.log_success = 0;
        self.log_total = 0;
        stats
    }

    fn persistence_key(&self) -> Option<String> {
        Some(self.persistence_key.clone())
    }

    fn do_persist(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!(self.known_paths.iter().collect::<Vec<_>>()))
    }

    fn load_persistence_data(&mut self, doc: serde_json::Value) {
        if let Ok(paths) = serde_json::from_value::<Vec<String>>(doc) {
            self.known_paths = paths.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_path(path: &str) -> LogAtom {
        let el = MatchElement::new(path.to_string(), "x".to_string(), Vec::new(), DecodedValue::Bytes(Vec::new()));
        let tree = MatchTree::from_root(&el);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", None)
    }

    #[test]
    fn first_path_is_always_new() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = NewMatchPathDetector::new("NewMatchPathDetector".to_string(), "default".to_string(), true, true, None, None);
        detector.receive_atom(&atom_with_path("root"), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }

    #[test]
    fn seen_path_does_not_fire_again() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = NewMatchPathDetector::new("NewMatchPathDetector".to_string(), "default".to_string(), true, true, None, None);
        detector.receive_atom(&atom_with_path("root"), &bus);
        detector.receive_atom(&atom_with_path("root"), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }

    #[test]
    fn learning_off_still_detects_but_does_not_remember() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = NewMatchPathDetector::new("NewMatchPathDetector".to_string(), "default".to_string(), true, false, None, None);
        detector.receive_atom(&atom_with_path("root"), &bus);
        detector.receive_atom(&atom_with_path("root"), &bus);
        assert_eq!(sink.sent_messages().len(), 2);
    }
}
