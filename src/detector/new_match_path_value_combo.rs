//! `NewMatchPathValueComboDetector`: maintains a set of previously seen
//! tuples across a fixed list of paths, emitting when a combination never
//! seen before appears. A generalisation of `new_match_path_value` from
//! a single path to a tuple of paths.

use std::collections::BTreeSet;

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, LearnMode};

pub struct NewMatchPathValueComboDetector {
    name: String,
    persistence_key: String,
    target_path_list: Vec<String>,
    seen: BTreeSet<Vec<String>>,
    learn_mode: LearnMode,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl NewMatchPathValueComboDetector {
    pub fn new(
        name: String,
        persistence_id: String,
        target_path_list: Vec<String>,
        output_logline: bool,
        learn_mode: bool,
        stop_learning_time: Option<f64>,
        stop_learning_no_anomaly_time: Option<f64>,
    ) -> Self {
        NewMatchPathValueComboDetector {
            persistence_key: crate::persistence::persistence_key("NewMatchPathValueComboDetector", &persistence_id),
            name,
            target_path_list,
            seen: BTreeSet::new(),
            learn_mode: LearnMode::new(learn_mode, stop_learning_time, stop_learning_no_anomaly_time),
            output_logline,
            log_success: 0,
            log_total: 0,
        }
    }

    fn combo(&self, atom: &LogAtom) -> Option<Vec<String>> {
        let tree = atom.match_tree.as_ref()?;
        let mut tuple = Vec::with_capacity(self.target_path_list.len());
        for path in &self.target_path_list {
            let matched = tree.get(path)?;
            tuple.push(matched.first().value.display_string());
        }
        Some(tuple)
    }
}

impl Detector for NewMatchPathValueComboDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        self.learn_mode.observe(atom.timestamp);
        let Some(combo) = self.combo(atom) else { return false };

        if !self.seen.contains(&combo) {
            let data = atom.raw_text_lossy().into_owned();
            let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
            bus.emit(AnomalyEvent {
                source: format!("Analysis.{}", self.name),
                message: "New value combination detected".to_string(),
                sorted_log_lines,
                event_data: serde_json::json!({
                    "AnalysisComponent": { "AffectedLogAtomPaths": self.target_path_list, "AffectedLogAtomValues": combo }
                }),
                log_atom: Some(atom.clone()),
                detector_name: self.name.clone(),
            });
            if self.learn_mode.is_learning() {
                self.seen.insert(combo);
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
        serde_json::to_value(&self.seen).ok()
    }

    fn load_persistence_data(&mut self, doc: serde_json::Value) {
        if let Ok(seen) = serde_json::from_value(doc) {
            self.seen = seen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_combo(user: &str, host: &str) -> LogAtom {
        let user_el = MatchElement::new("root/user".to_string(), "user".to_string(), user.as_bytes().to_vec(), DecodedValue::Bytes(user.as_bytes().to_vec()));
        let host_el = MatchElement::new("root/host".to_string(), "host".to_string(), host.as_bytes().to_vec(), DecodedValue::Bytes(host.as_bytes().to_vec()));
        let root = MatchElement::new("root".to_string(), "root".to_string(), Vec::new(), DecodedValue::List(vec![user_el, host_el]));
        let tree = MatchTree::from_root(&root);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", None)
    }

    #[test]
    fn new_combination_is_flagged_once() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = NewMatchPathValueComboDetector::new(
            "NewMatchPathValueComboDetector".to_string(),
            "default".to_string(),
            vec!["root/user".to_string(), "root/host".to_string()],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_combo("alice", "host-a"), &bus);
        detector.receive_atom(&atom_with_combo("alice", "host-a"), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }

    #[test]
    fn same_values_in_different_pairing_is_still_new() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = NewMatchPathValueComboDetector::new(
            "NewMatchPathValueComboDetector".to_string(),
            "default".to_string(),
            vec!["root/user".to_string(), "root/host".to_string()],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_combo("alice", "host-a"), &bus);
        detector.receive_atom(&atom_with_combo("alice", "host-b"), &bus);
        assert_eq!(sink.sent_messages().len(), 2);
    }
}
