//! `HistogramDetector`: maintains bucketed frequency distributions per
//! path and periodically emits a report of the current distribution via
//! the Time Trigger, then resets the counts for the next interval.

use std::collections::BTreeMap;

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, TriggerClass};

pub struct HistogramDetector {
    name: String,
    target_path_list: Vec<String>,
    report_interval_seconds: f64,
    split_reports_flag: bool,
    counts: BTreeMap<String, BTreeMap<String, u64>>,
    next_due: Option<f64>,
    log_success: u64,
    log_total: u64,
}

impl HistogramDetector {
    pub fn new(name: String, target_path_list: Vec<String>, report_interval_seconds: f64, split_reports_flag: bool) -> Self {
        HistogramDetector {
            name,
            target_path_list,
            report_interval_seconds,
            split_reports_flag,
            counts: BTreeMap::new(),
            next_due: None,
            log_success: 0,
            log_total: 0,
        }
    }

    fn emit_and_reset(&mut self, now: f64, bus: &EventBus) {
        if self.counts.values().all(|buckets| buckets.is_empty()) {
            return;
        }
        if self.split_reports_flag {
            for (path, buckets) in &self.counts {
                bus.emit(AnomalyEvent {
                    source: format!("Analysis.{}", self.name),
                    message: "Histogram report".to_string(),
                    sorted_log_lines: Vec::new(),
                    event_data: serde_json::json!({
                        "AnalysisComponent": { "AffectedLogAtomPaths": [path], "Buckets": buckets, "ToTime": now }
                    }),
                    log_atom: None,
                    detector_name: self.name.clone(),
                });
            }
        } else {
            bus.emit(AnomalyEvent {
                source: format!("Analysis.{}", self.name),
                message: "Histogram report".to_string(),
                sorted_log_lines: Vec::new(),
                event_data: serde_json::json!({
                    "AnalysisComponent": { "AffectedLogAtomPaths": self.target_path_list, "Buckets": self.counts, "ToTime": now }
                }),
                log_atom: None,
                detector_name: self.name.clone(),
            });
        }
        for buckets in self.counts.values_mut() {
            buckets.clear();
        }
    }
}

impl Detector for HistogramDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, _bus: &EventBus) -> bool {
        self.log_total += 1;
        let Some(tree) = atom.match_tree.as_ref() else { return false };

        let mut handled = false;
        for path in &self.target_path_list {
            let Some(matched) = tree.get(path) else { continue };
            handled = true;
            for element in matched.iter() {
                let bucket = element.value.display_string();
                *self.counts.entry(path.clone()).or_default().entry(bucket).or_insert(0) += 1;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_status(status: &str, timestamp: f64) -> LogAtom {
        let el = MatchElement::new("root/status".to_string(), "status".to_string(), status.as_bytes().to_vec(), DecodedValue::Bytes(status.as_bytes().to_vec()));
        let time_el = MatchElement::new("root/time".to_string(), "time".to_string(), Vec::new(), DecodedValue::Timestamp(timestamp));
        let root = MatchElement::new("root".to_string(), "root".to_string(), Vec::new(), DecodedValue::List(vec![el, time_el]));
        let tree = MatchTree::from_root(&root);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", Some("root/time".into()))
    }

    #[test]
    fn buckets_accumulate_until_report_time() {
        let bus = EventBus::new(Vec::new());
        let mut detector = HistogramDetector::new("HistogramDetector".to_string(), vec!["root/status".to_string()], 60.0, false);
        detector.receive_atom(&atom_with_status("200", 0.0), &bus);
        detector.receive_atom(&atom_with_status("200", 1.0), &bus);
        detector.receive_atom(&atom_with_status("500", 2.0), &bus);
        let buckets = detector.counts.get("root/status").unwrap();
        assert_eq!(buckets.get("200"), Some(&2));
        assert_eq!(buckets.get("500"), Some(&1));
    }

    #[test]
    fn timer_emits_report_and_resets_counts() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = HistogramDetector::new("HistogramDetector".to_string(), vec!["root/status".to_string()], 60.0, false);
        detector.receive_atom(&atom_with_status("200", 0.0), &bus);
        detector.do_timer(0.0, &bus);
        detector.do_timer(60.0, &bus);
        assert_eq!(sink.sent_messages().len(), 1);
        assert!(detector.counts.get("root/status").unwrap().is_empty());
    }
}
