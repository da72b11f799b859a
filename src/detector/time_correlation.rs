//! `TimeCorrelationViolationDetector`: given an event pair (A -> B) with
//! an expected latency window, tracks pending A-occurrences and emits
//! when a matching B doesn't arrive in time, or never arrives at all
//! (checked on the Time Trigger).

use std::collections::VecDeque;

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, TriggerClass};

pub struct TimeCorrelationViolationDetector {
    name: String,
    correlation_path_a: String,
    correlation_path_b: String,
    expected_latency_seconds: f64,
    pending: VecDeque<(f64, String)>,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl TimeCorrelationViolationDetector {
    pub fn new(name: String, correlation_path_a: String, correlation_path_b: String, expected_latency_seconds: f64, output_logline: bool) -> Self {
        TimeCorrelationViolationDetector {
            name,
            correlation_path_a,
            correlation_path_b,
            expected_latency_seconds,
            pending: VecDeque::new(),
            output_logline,
            log_success: 0,
            log_total: 0,
        }
    }
}

impl Detector for TimeCorrelationViolationDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, _bus: &EventBus) -> bool {
        self.log_total += 1;
        let Some(tree) = atom.match_tree.as_ref() else { return false };
        let Some(now) = atom.timestamp else { return false };

        let mut handled = false;
        if tree.contains(&self.correlation_path_a) {
            handled = true;
            let line = atom.raw_text_lossy().into_owned();
            self.pending.push_back((now, line));
        }
        if tree.contains(&self.correlation_path_b) {
            handled = true;
            self.pending.pop_front();
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
        while let Some((observed_at, line)) = self.pending.front() {
            if now - observed_at >= self.expected_latency_seconds {
                let sorted_log_lines = if self.output_logline { vec![line.clone()] } else { Vec::new() };
                bus.emit(AnomalyEvent {
                    source: format!("Analysis.{}", self.name),
                    message: "Expected correlated event did not arrive in time".to_string(),
                    sorted_log_lines,
                    event_data: serde_json::json!({
                        "AnalysisComponent": {
                            "PathA": self.correlation_path_a,
                            "PathB": self.correlation_path_b,
                            "ExpectedLatencySeconds": self.expected_latency_seconds,
                        }
                    }),
                    log_atom: None,
                    detector_name: self.name.clone(),
                });
                self.pending.pop_front();
            } else {
                break;
            }
        }
        Some(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_path(path: &str, timestamp: f64) -> LogAtom {
        let el = MatchElement::new(path.to_string(), "x".to_string(), Vec::new(), DecodedValue::Timestamp(timestamp));
        let tree = MatchTree::from_root(&el);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", Some(path.into()))
    }

    #[test]
    fn matching_b_within_window_clears_pending() {
        let bus = EventBus::new(Vec::new());
        let mut detector = TimeCorrelationViolationDetector::new("TimeCorrelationViolationDetector".to_string(), "root/a".to_string(), "root/b".to_string(), 10.0, true);
        detector.receive_atom(&atom_with_path("root/a", 0.0), &bus);
        detector.receive_atom(&atom_with_path("root/b", 5.0), &bus);
        assert!(detector.pending.is_empty());
    }

    #[test]
    fn missing_b_after_window_emits() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = TimeCorrelationViolationDetector::new("TimeCorrelationViolationDetector".to_string(), "root/a".to_string(), "root/b".to_string(), 10.0, true);
        detector.receive_atom(&atom_with_path("root/a", 0.0), &bus);
        detector.do_timer(20.0, &bus);
        assert_eq!(sink.sent_messages().len(), 1);
        assert!(detector.pending.is_empty());
    }
}
