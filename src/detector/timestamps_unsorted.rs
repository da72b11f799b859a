//! `TimestampsUnsortedDetector`: stateless except for `last_timestamp`.
//! Emits when a parsed timestamp is strictly less than the last accepted
//! one. An optional fatal mode terminates the process instead of merely
//! emitting.

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::Detector;

pub struct TimestampsUnsortedDetector {
    name: String,
    last_timestamp: Option<f64>,
    exit_on_error_flag: bool,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl TimestampsUnsortedDetector {
    pub fn new(name: String, exit_on_error_flag: bool, output_logline: bool) -> Self {
        TimestampsUnsortedDetector {
            name,
            last_timestamp: None,
            exit_on_error_flag,
            output_logline,
            log_success: 0,
            log_total: 0,
        }
    }
}

impl Detector for TimestampsUnsortedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool {
        self.log_total += 1;
        let Some(now) = atom.timestamp else { return false };

        let last = self.last_timestamp;
        self.last_timestamp = Some(now);

        if let Some(last) = last {
            if now < last {
                let data = atom.raw_text_lossy().into_owned();
                let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
                bus.emit(AnomalyEvent {
                    source: format!("Analysis.{}", self.name),
                    message: "Timestamp out of order".to_string(),
                    sorted_log_lines,
                    event_data: serde_json::json!({
                        "AnalysisComponent": { "ObservedTimestamp": now, "LastTimestamp": last }
                    }),
                    log_atom: Some(atom.clone()),
                    detector_name: self.name.clone(),
                });
                if self.exit_on_error_flag {
                    tracing::error!(observed = now, last, "terminating on unsorted timestamp per ExitOnErrorFlag");
                    std::process::exit(1);
                }
                self.log_success += 1;
                return true;
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
}
