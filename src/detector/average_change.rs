//! `MatchValueAverageChangeDetector`: per path, tracks a rolling mean and
//! standard deviation (Welford's online algorithm) and emits when a new
//! observation deviates beyond a configured number of standard
//! deviations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::atom::LogAtom;
use crate::event::{AnomalyEvent, EventBus};

use super::{Detector, LearnMode};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

pub struct MatchValueAverageChangeDetector {
    name: String,
    persistence_key: String,
    target_path_list: Vec<String>,
    sigma_threshold: f64,
    stats: HashMap<String, RunningStats>,
    learn_mode: LearnMode,
    output_logline: bool,
    log_success: u64,
    log_total: u64,
}

impl MatchValueAverageChangeDetector {
    pub fn new(
        name: String,
        persistence_id: String,
        target_path_list: Vec<String>,
        sigma_threshold: f64,
        output_logline: bool,
        learn_mode: bool,
        stop_learning_time: Option<f64>,
        stop_learning_no_anomaly_time: Option<f64>,
    ) -> Self {
        MatchValueAverageChangeDetector {
            persistence_key: crate::persistence::persistence_key("MatchValueAverageChangeDetector", &persistence_id),
            name,
            target_path_list,
            sigma_threshold,
            stats: HashMap::new(),
            learn_mode: LearnMode::new(learn_mode, stop_learning_time, stop_learning_no_anomaly_time),
            output_logline,
            log_success: 0,
            log_total: 0,
        }
    }
}

impl Detector for MatchValueAverageChangeDetector {
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
            let Some(value) = matched.first().value.as_numeric() else { continue };
            handled = true;

            let stats = self.stats.entry(path.clone()).or_default();
            if stats.count >= 2 {
                let stddev = stats.stddev();
                let deviation = if stddev > 0.0 { (value - stats.mean).abs() / stddev } else { 0.0 };
                if deviation > self.sigma_threshold {
                    let data = atom.raw_text_lossy().into_owned();
                    let sorted_log_lines = if self.output_logline { vec![data.clone()] } else { vec![data] };
                    bus.emit(AnomalyEvent {
                        source: format!("Analysis.{}", self.name),
                        message: "Value deviates from rolling average".to_string(),
                        sorted_log_lines,
                        event_data: serde_json::json!({
                            "AnalysisComponent": {
                                "AffectedLogAtomPaths": [path],
                                "AffectedLogAtomValues": [value],
                                "Mean": stats.mean,
                                "StdDev": stddev,
                                "SigmaThreshold": self.sigma_threshold,
                            }
                        }),
                        log_atom: Some(atom.clone()),
                        detector_name: self.name.clone(),
                    });
                }
            }
            if self.learn_mode.is_learning() {
                stats.update(value);
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
        serde_json::to_value(&self.stats).ok()
    }

    fn load_persistence_data(&mut self, doc: serde_json::Value) {
        if let Ok(stats) = serde_json::from_value(doc) {
            self.stats = stats;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_value(value: f64) -> LogAtom {
        let el = MatchElement::new("root/latency".to_string(), "latency".to_string(), Vec::new(), DecodedValue::Integer(value as i64));
        let tree = MatchTree::from_root(&el);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", None)
    }

    #[test]
    fn stable_values_never_flagged() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = MatchValueAverageChangeDetector::new(
            "MatchValueAverageChangeDetector".to_string(),
            "default".to_string(),
            vec!["root/latency".to_string()],
            3.0,
            true,
            true,
            None,
            None,
        );
        for v in [10.0, 11.0, 9.0, 10.0, 10.5, 9.5] {
            detector.receive_atom(&atom_with_value(v), &bus);
        }
        assert!(sink.sent_messages().is_empty());
    }

    #[test]
    fn extreme_outlier_is_flagged() {
        let sink = std::rc::Rc::new(crate::event::sinks::MailSink::new());
        let bus = EventBus::new(vec![sink.clone()]);
        let mut detector = MatchValueAverageChangeDetector::new(
            "MatchValueAverageChangeDetector".to_string(),
            "default".to_string(),
            vec!["root/latency".to_string()],
            3.0,
            true,
            true,
            None,
            None,
        );
        for v in [10.0, 11.0, 9.0, 10.0, 10.5, 9.5] {
            detector.receive_atom(&atom_with_value(v), &bus);
        }
        detector.receive_atom(&atom_with_value(10000.0), &bus);
        assert_eq!(sink.sent_messages().len(), 1);
    }
}
