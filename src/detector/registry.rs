//! Resolves a `DetectorConfig.detector_type` string into a constructed
//! detector instance. One arm per concrete detector; unknown types are
//! reported as a config error rather than silently skipped.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config::types::DetectorConfig;
use crate::detector::{
    allowlist_violation::AllowlistViolationDetector, average_change::MatchValueAverageChangeDetector,
    enhanced_new_value_combo::EnhancedNewValueComboDetector, histogram::HistogramDetector, new_match_path::NewMatchPathDetector,
    new_match_path_value::NewMatchPathValueDetector, new_match_path_value_combo::NewMatchPathValueComboDetector,
    parser_count::ParserCountDetector, time_correlation::TimeCorrelationViolationDetector, timestamps_unsorted::TimestampsUnsortedDetector,
    value_range::ValueRangeDetector, Detector, MatchRule,
};

/// Every `detector_type` string this build recognises, used both to
/// build instances and to validate configs ahead of time.
pub const ALL_DETECTOR_TYPES: &[&str] = &[
    "new_match_path",
    "new_match_path_value",
    "new_match_path_value_combo",
    "value_range",
    "enhanced_new_value_combo",
    "histogram",
    "match_value_average_change",
    "time_correlation_violation",
    "timestamps_unsorted",
    "allowlist_violation",
    "parser_count",
];

#[derive(Debug, Error)]
pub enum DetectorBuildError {
    #[error("Analysis[{id}]: unknown detector type '{detector_type}'")]
    UnknownType { id: String, detector_type: String },
    #[error("Analysis[{id}]: {field} is required for detector type '{detector_type}'")]
    MissingField { id: String, detector_type: String, field: &'static str },
}

fn persistence_id(config: &DetectorConfig) -> String {
    config.persistence_id.clone().unwrap_or_else(|| config.id.clone())
}

fn require_target_paths(config: &DetectorConfig) -> Result<Vec<String>, DetectorBuildError> {
    if config.target_path_list.is_empty() {
        return Err(DetectorBuildError::MissingField { id: config.id.clone(), detector_type: config.detector_type.clone(), field: "target_path_list" });
    }
    Ok(config.target_path_list.clone())
}

/// Builds the concrete detector named by `config.detector_type`, applying
/// the pipeline-wide learn-mode override already resolved by the caller.
pub fn build_detector(config: &DetectorConfig, learn_mode: bool) -> Result<Rc<RefCell<dyn Detector>>, DetectorBuildError> {
    let boxed: Rc<RefCell<dyn Detector>> = match config.detector_type.as_str() {
        "new_match_path" => Rc::new(RefCell::new(NewMatchPathDetector::new(
            config.id.clone(),
            persistence_id(config),
            config.output_logline,
            learn_mode,
            config.stop_learning_time,
            config.stop_learning_no_anomaly_time,
        ))),
        "new_match_path_value" => Rc::new(RefCell::new(NewMatchPathValueDetector::new(
            config.id.clone(),
            persistence_id(config),
            require_target_paths(config)?,
            config.output_logline,
            learn_mode,
            config.stop_learning_time,
            config.stop_learning_no_anomaly_time,
        ))),
        "new_match_path_value_combo" => Rc::new(RefCell::new(NewMatchPathValueComboDetector::new(
            config.id.clone(),
            persistence_id(config),
            require_target_paths(config)?,
            config.output_logline,
            learn_mode,
            config.stop_learning_time,
            config.stop_learning_no_anomaly_time,
        ))),
        "value_range" => Rc::new(RefCell::new(ValueRangeDetector::new(
            config.id.clone(),
            persistence_id(config),
            config.id_path_list.clone(),
            require_target_paths(config)?,
            config.ignore_list.clone(),
            config.constraint_list.clone(),
            config.output_logline,
            learn_mode,
            config.stop_learning_time,
            config.stop_learning_no_anomaly_time,
        ))),
        "enhanced_new_value_combo" => Rc::new(RefCell::new(EnhancedNewValueComboDetector::new(
            config.id.clone(),
            persistence_id(config),
            require_target_paths(config)?,
            config.output_logline,
            learn_mode,
            config.stop_learning_time,
            config.stop_learning_no_anomaly_time,
        ))),
        "histogram" => Rc::new(RefCell::new(HistogramDetector::new(
            config.id.clone(),
            require_target_paths(config)?,
            config.report_interval_seconds.unwrap_or(3600) as f64,
            config.split_reports_flag,
        ))),
        "match_value_average_change" => {
            let sigma_threshold = config.sigma_threshold.ok_or_else(|| DetectorBuildError::MissingField {
                id: config.id.clone(),
                detector_type: config.detector_type.clone(),
                field: "sigma_threshold",
            })?;
            Rc::new(RefCell::new(MatchValueAverageChangeDetector::new(
                config.id.clone(),
                persistence_id(config),
                require_target_paths(config)?,
                sigma_threshold,
                config.output_logline,
                learn_mode,
                config.stop_learning_time,
                config.stop_learning_no_anomaly_time,
            )))
        }
        "time_correlation_violation" => {
            let path_a = config.correlation_path_a.clone().ok_or_else(|| DetectorBuildError::MissingField {
                id: config.id.clone(),
                detector_type: config.detector_type.clone(),
                field: "correlation_path_a",
            })?;
            let path_b = config.correlation_path_b.clone().ok_or_else(|| DetectorBuildError::MissingField {
                id: config.id.clone(),
                detector_type: config.detector_type.clone(),
                field: "correlation_path_b",
            })?;
            Rc::new(RefCell::new(TimeCorrelationViolationDetector::new(
                config.id.clone(),
                path_a,
                path_b,
                config.expected_latency_seconds.unwrap_or(0.0),
                config.output_logline,
            )))
        }
        "timestamps_unsorted" => Rc::new(RefCell::new(TimestampsUnsortedDetector::new(config.id.clone(), config.exit_on_error_flag, config.output_logline))),
        "allowlist_violation" => {
            let rules = config
                .allowlist_rules
                .iter()
                .map(|rule| MatchRule { path: rule.path.clone(), value: rule.value.clone() })
                .collect();
            Rc::new(RefCell::new(AllowlistViolationDetector::new(config.id.clone(), rules, config.output_logline)))
        }
        "parser_count" => Rc::new(RefCell::new(ParserCountDetector::new(
            config.id.clone(),
            require_target_paths(config)?,
            config.target_label_list.clone(),
            config.report_interval_seconds.unwrap_or(3600) as f64,
            config.split_reports_flag,
        ))),
        other => {
            return Err(DetectorBuildError::UnknownType { id: config.id.clone(), detector_type: other.to_string() });
        }
    };
    Ok(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(detector_type: &str) -> DetectorConfig {
        DetectorConfig {
            id: "d1".to_string(),
            detector_type: detector_type.to_string(),
            persistence_id: None,
            auto_include_flag: true,
            id_path_list: Vec::new(),
            target_path_list: vec!["root/path".to_string()],
            target_label_list: Vec::new(),
            ignore_list: Vec::new(),
            constraint_list: Vec::new(),
            report_interval_seconds: None,
            split_reports_flag: false,
            stop_learning_time: None,
            stop_learning_no_anomaly_time: None,
            exit_on_error_flag: false,
            output_logline: true,
            allowlist_rules: Vec::new(),
            sigma_threshold: Some(3.0),
            expected_latency_seconds: Some(1.0),
            correlation_path_a: Some("root/a".to_string()),
            correlation_path_b: Some("root/b".to_string()),
        }
    }

    #[test]
    fn builds_every_known_detector_type() {
        for detector_type in ALL_DETECTOR_TYPES {
            let config = base_config(detector_type);
            let built = build_detector(&config, true);
            assert!(built.is_ok(), "failed to build {}: {:?}", detector_type, built.err());
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let config = base_config("does_not_exist");
        assert!(matches!(build_detector(&config, true), Err(DetectorBuildError::UnknownType { .. })));
    }

    #[test]
    fn missing_target_paths_is_rejected() {
        let mut config = base_config("new_match_path_value");
        config.target_path_list.clear();
        assert!(matches!(build_detector(&config, true), Err(DetectorBuildError::MissingField { .. })));
    }
}
