//! `EnhancedNewValueComboDetector`: like the plain value-combo detector,
//! but keeps an occurrence count and first/last-seen timestamp per combo
//! instead of a bare set membership test.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, LearnMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ComboStats {
    count: u64,
    first_seen: Option<f64>,
    last_seen: Option<f64>,
}

pub struct EnhancedNewValueComboDetector {
    name: String,
    persistence_key: String,
    target_path_list: Vec<String>,
    seen: BTreeMap<Vec<String>, ComboStats>,
    learn_mode: LearnMode,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl EnhancedNewValueComboDetector {
    pub fn new(
        name: String,
        persistence_id: String,
        target_path_list: Vec<String>,
        output_logline: bool,
        learn_mode: bool,
        stop_learning_time: Option<f64>,
        stop_learning_no_anomaly_time: Option<f64>,
    ) -> Self {
        EnhancedNewValueComboDetector {
            persistence_key: crate::persistence::persistence_key("EnhancedNewValueComboDetector", &persistence_id),
            name,
            target_path_list,
            seen: BTreeMap::new(),
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

impl Detector for EnhancedNewValueComboDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        self.learn_mode.observe(atom.timestamp);
        let Some(combo) = self.combo(atom) else { return false };

        let is_new = !self.seen.contains_key(&combo);
        if is_new {
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
        }

        if self.learn_mode.is_learning() || !is_new {
            let entry = self.seen.entry(combo).or_insert(ComboStats { count: 0, first_seen: atom.timestamp, last_seen: atom.timestamp });
            entry.count += 1;
            entry.last_seen = atom.timestamp;
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

    fn atom_with_combo(user: &str, timestamp: f64) -> LogAtom {
        let user_el = MatchElement::new("root/user".to_string(), "user".to_string(), user.as_bytes().to_vec(), DecodedValue::Bytes(user.as_bytes().to_vec()));
        let time_el = MatchElement::new("root/time".to_string(), "time".to_string(), Vec::new(), DecodedValue::Timestamp(timestamp));
        let root = MatchElement::new("root".to_string(), "root".to_string(), Vec::new(), DecodedValue::List(vec![user_el, time_el]));
        let tree = MatchTree::from_root(&root);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", Some("root/time".into()))
    }

    #[test]
    fn counts_repeat_occurrences() {
        let bus = EventBus::new(Vec::new());
        let mut detector = EnhancedNewValueComboDetector::new(
            "EnhancedNewValueComboDetector".to_string(),
            "default".to_string(),
            vec!["root/user".to_string()],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_combo("alice", 1.0), &bus);
        detector.receive_atom(&atom_with_combo("alice", 2.0), &bus);
        detector.receive_atom(&atom_with_combo("alice", 3.0), &bus);
        let stats = detector.seen.get(&vec!["alice".to_string()]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.first_seen, Some(1.0));
        assert_eq!(stats.last_seen, Some(3.0));
    }

    #[test]
    fn first_occurrence_emits_once() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = EnhancedNewValueComboDetector::new(
            "EnhancedNewValueComboDetector".to_string(),
            "default".to_string(),
            vec!["root/user".to_string()],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_combo("alice", 1.0), &bus);
        detector.receive_atom(&atom_with_combo("alice", 2.0), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }
}
