//! `ValueRangeDetector`: emits when an observed numeric value falls
//! outside the learned `[min, max]` interval for its `id_path_list` key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{skip_atom, Detector, LearnMode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Ranges {
    min: HashMap<String, f64>,
    max: HashMap<String, f64>,
}

pub struct ValueRangeDetector {
    name: String,
    persistence_key: String,
    id_path_list: Vec<String>,
    target_path_list: Vec<String>,
    ignore_list: Vec<String>,
    constraint_list: Vec<String>,
    output_logline: bool,
    ranges: Ranges,
    learn_mode: LearnMode,
    log_success: u64,
    log_total: u64,
}

impl ValueRangeDetector {
    pub fn new(
        name: String,
        persistence_id: String,
        id_path_list: Vec<String>,
        target_path_list: Vec<String>,
        ignore_list: Vec<String>,
        constraint_list: Vec<String>,
        output_logline: bool,
        learn_mode: bool,
        stop_learning_time: Option<f64>,
        stop_learning_no_anomaly_time: Option<f64>,
    ) -> Self {
        ValueRangeDetector {
            persistence_key: crate::persistence::persistence_key("ValueRangeDetector", &persistence_id),
            name,
            id_path_list,
            target_path_list,
            ignore_list,
            constraint_list,
            output_logline,
            ranges: Ranges::default(),
            learn_mode: LearnMode::new(learn_mode, stop_learning_time, stop_learning_no_anomaly_time),
            log_success: 0,
            log_total: 0,
        }
    }

    fn id_values(&self, atom: &LogAtom) -> Vec<String> {
        let Some(tree) = atom.match_tree.as_ref() else { return Vec::new() };
        let mut parts = Vec::new();
        for path in &self.id_path_list {
            if let Some(matched) = tree.get(path) {
                for element in matched.iter() {
                    parts.push(element.value.display_string());
                }
            }
        }
        parts
    }

    fn id_key(&self, atom: &LogAtom) -> String {
        self.id_values(atom).join("\u{1}")
    }

    fn collect_values(&self, atom: &LogAtom) -> Vec<f64> {
        let Some(tree) = atom.match_tree.as_ref() else { return Vec::new() };
        let mut values = Vec::new();
        for path in &self.target_path_list {
            if let Some(matched) = tree.get(path) {
                for element in matched.iter() {
                    if let Some(v) = element.value.as_numeric() {
                        values.push(v);
                    }
                }
            }
        }
        values
    }
}

impl Detector for ValueRangeDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        self.learn_mode.observe(atom.timestamp);

        if skip_atom(atom, &self.ignore_list, &self.constraint_list) {
            return false;
        }
        let values = self.collect_values(atom);
        if values.is_empty() {
            return false;
        }
        let id_key = self.id_key(atom);

        let min = self.ranges.min.get(&id_key).copied();
        let max = self.ranges.max.get(&id_key).copied();
        if let (Some(min), Some(max)) = (min, max) {
            let observed_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let observed_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if observed_min < min || observed_max > max {
                let data = atom.raw_text_lossy().into_owned();
                let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
                let event_data = serde_json::json!({
                    "AnalysisComponent": {
                        "AffectedLogAtomPaths": self.target_path_list,
                        "AffectedLogAtomValues": values,
                        "Range": [min, max],
                        "IDpaths": self.id_path_list,
                        "IDvalues": self.id_values(atom),
                    }
                });
                bus.emit(AnomalyEvent {
                    source: format!("Analysis.{}", self.name),
                    message: "Value range anomaly detected".to_string(),
                    sorted_log_lines,
                    event_data,
                    log_atom: Some(atom.clone()),
                    detector_name: self.name.clone(),
                });
            }
        }

        if self.learn_mode.is_learning() {
            let observed_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let observed_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            self.ranges
                .min
                .entry(id_key.clone())
                .and_modify(|m| *m = m.min(observed_min))
                .or_insert(observed_min);
            self.ranges
                .max
                .entry(id_key)
                .and_modify(|m| *m = m.max(observed_max))
                .or_insert(observed_max);
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
        Some(serde_json::to_value(&self.ranges).unwrap_or_default())
    }

    fn load_persistence_data(&mut self, doc: serde_json::Value) {
        if let Ok(ranges) = serde_json::from_value(doc) {
            self.ranges = ranges;
        }
    }

    fn allowlist_event(&mut self, kind: &str, data: &str) -> Option<Result<String, String>> {
        if kind != self.name {
            return Some(Err("event not from this source".to_string()));
        }
        if !self.constraint_list.iter().any(|p| p == data) {
            self.constraint_list.push(data.to_string());
        }
        self.ignore_list.retain(|p| p != data);
        Some(Ok(format!("Allowlisted path {}.", data)))
    }

    fn blocklist_event(&mut self, kind: &str, data: &str) -> Option<Result<String, String>> {
        if kind != self.name {
            return Some(Err("event not from this source".to_string()));
        }
        if !self.ignore_list.iter().any(|p| p == data) {
            self.ignore_list.push(data.to_string());
        }
        self.constraint_list.retain(|p| p != data);
        Some(Ok(format!("Blocklisted path {}.", data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_values(id: &str, value: f64) -> LogAtom {
        let id_el = MatchElement::new("root/id".to_string(), "id".to_string(), id.as_bytes().to_vec(), DecodedValue::Bytes(id.as_bytes().to_vec()));
        let value_el = MatchElement::new("root/value".to_string(), "value".to_string(), Vec::new(), DecodedValue::Integer(value as i64));
        let root = MatchElement::new("root".to_string(), "root".to_string(), Vec::new(), DecodedValue::List(vec![id_el, value_el]));
        let tree = MatchTree::from_root(&root);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", None)
    }

    #[test]
    fn learns_range_and_flags_outliers() {
        let bus = EventBus::new(Vec::new());
        let mut detector = ValueRangeDetector::new(
            "ValueRangeDetector".to_string(),
            "default".to_string(),
            vec!["root/id".to_string()],
            vec!["root/value".to_string()],
            vec![],
            vec![],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_values("host-a", 10.0), &bus);
        detector.receive_atom(&atom_with_values("host-a", 20.0), &bus);
        assert_eq!(detector.ranges.min.get(&"host-a".to_string()), Some(&10.0));
        assert_eq!(detector.ranges.max.get(&"host-a".to_string()), Some(&20.0));
    }

    #[test]
    fn out_of_range_without_learning_emits_event() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = ValueRangeDetector::new(
            "ValueRangeDetector".to_string(),
            "default".to_string(),
            vec!["root/id".to_string()],
            vec!["root/value".to_string()],
            vec![],
            vec![],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_values("host-a", 10.0), &bus);
        detector.receive_atom(&atom_with_values("host-a", 20.0), &bus);

        detector.learn_mode = LearnMode::new(false, None, None);
        detector.receive_atom(&atom_with_values("host-a", 25.0), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }

    #[test]
    fn persistence_round_trips() {
        let bus = EventBus::new(Vec::new());
        let mut detector = ValueRangeDetector::new(
            "ValueRangeDetector".to_string(),
            "default".to_string(),
            vec!["root/id".to_string()],
            vec!["root/value".to_string()],
            vec![],
            vec![],
            true,
            true,
            None,
            None,
        );
        detector.receive_atom(&atom_with_values("host-a", 10.0), &bus);
        let persisted = detector.do_persist().unwrap();

        let mut reloaded = ValueRangeDetector::new(
            "ValueRangeDetector".to_string(),
            "default".to_string(),
            vec!["root/id".to_string()],
            vec!["root/value".to_string()],
            vec![],
            vec![],
            true,
            false,
            None,
            None,
        );
        reloaded.load_persistence_data(persisted);
        assert_eq!(reloaded.ranges.min.get(&"host-a".to_string()), Some(&10.0));
    }

    #[test]
    fn constraint_list_requires_path_presence() {
        let bus = EventBus::new(Vec::new());
        let mut detector = ValueRangeDetector::new(
            "ValueRangeDetector".to_string(),
            "default".to_string(),
            vec!["root/id".to_string()],
            vec!["root/value".to_string()],
            vec![],
            vec!["root/missing".to_string()],
            true,
            true,
            None,
            None,
        );
        let handled = detector.receive_atom(&atom_with_values("host-a", 10.0), &bus);
        assert!(!handled);
        assert!(detector.ranges.min.is_empty());
    }
}
