//! `AllowlistViolationDetector`: holds an ordered list of `MatchRule`
//! objects; on each atom, evaluates rules in order until one matches,
//! emitting if none does.

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, MatchRule};

pub struct AllowlistViolationDetector {
    name: String,
    rules: Vec<MatchRule>,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl AllowlistViolationDetector {
    pub fn new(name: String, rules: Vec<MatchRule>, output_logline: bool) -> Self {
        AllowlistViolationDetector { name, rules, output_logline, log_success: 0, log_total: 0 }
    }
}

impl Detector for AllowlistViolationDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        if atom.match_tree.is_none() {
            return false;
        }
        if self.rules.iter().any(|rule| rule.matches(atom)) {
            self.log_success += 1;
            return true;
        }

        let data = atom.raw_text_lossy().into_owned();
        let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
        bus.emit(AnomalyEvent {
            source: format!("Analysis.{}", self.name),
            message: "No allowlist rule matched".to_string(),
            sorted_log_lines,
            event_data: serde_json::json!({ "AnalysisComponent": {} }),
            log_atom: Some(atom.clone()),
            detector_name: self.name.clone(),
        });
        false
    }

    fn log_statistics(&mut self) -> (u64, u64) {
        let stats = (self.log_success, self.log_total);
        self.log_success = 0;
        self.log_total = 0;
        stats
    }

    fn allowlist_event(&mut self, kind: &str, data: &str) -> Option<Result<String, String>> {
        if kind != self.name {
            return Some(Err("event not from this source".to_string()));
        }
        self.rules.push(MatchRule { path: data.to_string(), value: None });
        Some(Ok(format!("Allowlisted path {}.", data)))
    }
}
