//! `NewMatchPathValueDetector`: per configured path, maintains a set of
//! previously seen decoded values and emits when a new one appears.

use std::collections::{BTreeMap, BTreeSet};

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, LearnMode};

pub struct NewMatchPathValueDetector {
    name: String,
    persistence_key: String,
    target_path_list: Vec<String>,
    seen: BTreeMap<String, BTreeSet<String>>,
    learn_mode: LearnMode,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl NewMatchPathValueDetector {
    pub fn new(
        name: String,
        persistence_id: String,
        target_path_list: Vec<String>,
        output_logline: bool,
        learn_mode: bool,
        stop_learning_time: Option<f64>,
        stop_learning_no_anomaly_time: Option<f64>,
    ) -> Self {
        NewMatchPathValueDetector {
            persistence_key: crate::persistence::persistence_key("NewMatchPathValueDetector", &persistence_id),
            name,
            target_path_list,
            seen: BTreeMap::new(),
            learn_mode: LearnMode::new(learn_mode, stop_learning_time, stop_learning_no_anomaly_time),
            output_logline,
            log_success: 0,
            log_total: 0,
        }
    }
}

impl Detector for NewMatchPathValueDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        self.learn_mode.observe(atom.timestamp);
        let Some(tree) = atom.match_tree.as_ref() else { return false };

        let mut handled = false;
        for path in &self.target_path_list {
            let Some(matched) = tree.get(path) else { continue };
            handled = true;
            for element in matched.iter() {
                let value = element.value.display_string();
                let known = self.seen.get(path).is_some_and(|set| set.contains(&value));
                if !known {
                    let data = atom.raw_text_lossy().into_owned();
                    let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
                    bus.emit(AnomalyEvent {
                        source: format!("Analysis.{}", self.name),
                        message: format!("New value for path {}", path),
                        sorted_log_lines,
                        event_data: serde_json::json!({
                            "AnalysisComponent": { "AffectedLogAtomPaths": [path], "AffectedLogAtomValues": [value] }
                        }),
                        log_atom: Some(atom.clone()),
                        detector_name: self.name.clone(),
                    });
                    if self.learn_mode.is_learning() {
                        self.seen.entry(path.clone()).or_default().insert(value);
                    }
                }
            }
        }
        if handled {
            self.log_success += 1;
        }
        handled
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

    fn atom_with_value(value: &str) -> LogAtom {
        let el = MatchElement::new("root/user".to_string(), "user".to_string(), value.as_bytes().to_vec(), DecodedValue::Bytes(value.as_bytes().to_vec()));
        let tree = MatchTree::from_root(&el);
        LogAtom::new(value.as_bytes().to_vec(), Some(tree), "src", None)
    }

    #[test]
    fn monotonic_growth_of_seen_values() {
        let bus = EventBus::new(vec![]);
        let mut detector = NewMatchPathValueDetector::new(
            "NewMatchPathValueDetector".to_string(),
            "default".to_string(),
            vec!["root/user".to_string()],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_value("alice"), &bus);
        detector.receive_atom(&atom_with_value("bob"), &bus);
        let seen = detector.seen.get("root/user").unwrap();
        assert!(seen.contains("alice"));
        assert!(seen.contains("bob"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn repeated_value_does_not_emit() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = NewMatchPathValueDetector::new(
            "NewMatchPathValueDetector".to_string(),
            "default".to_string(),
            vec!["root/user".to_string()],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_value("alice"), &bus);
        detector.receive_atom(&atom_with_value("alice"), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }
}
