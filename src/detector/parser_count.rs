//! `ParserCountDetector`: counts occurrences per target path over a
//! reporting interval; on each Time Trigger boundary, emits either one
//! aggregated report or one report per path.

use std::collections::BTreeMap;

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, TriggerClass};

pub struct ParserCountDetector {
    name: String,
    target_path_list: Vec<String>,
    target_label_list: Vec<String>,
    report_interval_seconds: f64,
    split_reports_flag: bool,
    counts: BTreeMap<String, u64>,
    next_due: Option<f64>,
}

impl ParserCountDetector {
    pub fn new(
        name: String,
        target_path_list: Vec<String>,
        target_label_list: Vec<String>,
        report_interval_seconds: f64,
        split_reports_flag: bool,
    ) -> Self {
        ParserCountDetector {
            name,
            target_path_list,
            target_label_list,
            report_interval_seconds,
            split_reports_flag,
            counts: BTreeMap::new(),
            next_due: None,
        }
    }

    /// The report key for `target_path_list[index]`: the matching
    /// `target_label_list` entry when labels are configured, else the
    /// path itself. `validate_config` guarantees the two lists are
    /// either both empty or the same length, so this index never panics.
    fn report_key(&self, index: usize) -> &str {
        self.target_label_list.get(index).map(String::as_str).unwrap_or(&self.target_path_list[index])
    }

    fn emit_and_reset(&mut self, now: f64, bus: &EventBus) {
        if self.split_reports_flag {
            for (i, path) in self.target_path_list.iter().enumerate() {
                let count = self.counts.get(path).copied().unwrap_or(0);
                bus.emit(AnomalyEvent {
                    source: format!("Analysis.{}", self.name),
                    message: "Parser count report".to_string(),
                    sorted_log_lines: Vec::new(),
                    event_data: serde_json::json!({
                        "AnalysisComponent": { "AffectedLogAtomPaths": [path], "Label": self.report_key(i), "Count": count, "ToTime": now }
                    }),
                    log_atom: None,
                    detector_name: self.name.clone(),
                });
            }
        } else {
            let labeled_counts: BTreeMap<&str, u64> = self
                .target_path_list
                .iter()
                .enumerate()
                .map(|(i, path)| (self.report_key(i), self.counts.get(path).copied().unwrap_or(0)))
                .collect();
            bus.emit(AnomalyEvent {
                source: format!("Analysis.{}", self.name),
                message: "Parser count report".to_string(),
                sorted_log_lines: Vec::new(),
                event_data: serde_json::json!({
                    "AnalysisComponent": { "AffectedLogAtomPaths": self.target_path_list, "Counts": labeled_counts, "ToTime": now }
                }),
                log_atom: None,
                detector_name: self.name.clone(),
            });
        }
        self.counts.clear();
    }
}

impl Detector for ParserCountDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, _bus: &EventBus) -> bool {
        let Some(tree) = atom.match_tree.as_ref() else { return false };
        let mut handled = false;
        for path in &self.target_path_list {
            if tree.contains(path) {
                handled = true;
                *self.counts.entry(path.clone()).or_insert(0) += 1;
            }
        }
        handled
    }

    fn log_statistics(&mut self) -> (u64, u64) {
        (0, 0)
    }

    fn time_trigger_class(&self) -> Option<TriggerClass> {
        Some(TriggerClass::Analysis)
    }

    fn do_timer(&mut self, now: f64, bus: &EventBus) -> Option<f64> {
        let due = self.next_due.get_or_insert(now + self.report_interval_seconds);
        if now >= *due {
            self.emit_and_reset(now, bus);
            self.next_due = Some(now + self.report_interval_seconds);
        }
        Some(self.report_interval_seconds)
    }
}
