use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use thiserror::Error;

use crate::config::expand_tilde;
use crate::detector::registry::ALL_DETECTOR_TYPES;
use crate::parser::registry::collect_reference_errors;

use super::types::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(e.kind(), format!("failed to open config file '{}': {}", path.display(), e)))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string)
        .map_err(|e| ConfigError::Io(std::io::Error::new(e.kind(), format!("failed to read config file '{}': {}", path.display(), e))))?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn expand_paths(config: &mut Config) {
    for source in &mut config.input.sources {
        source.path = expand_tilde(&source.path);
    }
    for handler in &mut config.event_handlers {
        if let Some(path) = &handler.path {
            handler.path = Some(expand_tilde(path));
        }
    }
    config.persistence.base_dir = expand_tilde(&config.persistence.base_dir);
    for writer in &mut config.stream_writers {
        writer.sink_path = expand_tilde(&writer.sink_path);
    }
}

/// Collects every configuration error instead of aborting at the first
/// one, so a single run surfaces the full set of problems to fix.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    collect_reference_errors(&config.parser, &mut errors);

    let start_count = config.parser.iter().filter(|e| e.start).count();
    if start_count == 0 {
        errors.push("Parser: no element is marked start: true".to_string());
    } else if start_count > 1 {
        errors.push(format!("Parser: {} elements are marked start: true, expected exactly one", start_count));
    }

    if config.input.sources.is_empty() {
        errors.push("Input: at least one source is required".to_string());
    }

    for (i, detector) in config.analysis.iter().enumerate() {
        for path in detector.id_path_list.iter().chain(detector.target_path_list.iter()) {
            if path.is_empty() {
                errors.push(format!("Analysis[{}] ('{}'): path entries must not be empty", i, detector.id));
            }
        }
        if !ALL_DETECTOR_TYPES.contains(&detector.detector_type.as_str()) {
            errors.push(format!("Analysis[{}] ('{}'): unknown detector type '{}'", i, detector.id, detector.detector_type));
        }

        if !detector.target_label_list.is_empty() {
            if detector.target_path_list.is_empty() {
                errors.push(format!(
                    "Analysis[{}] ('{}'): target_label_list is configured without target_path_list",
                    i, detector.id
                ));
            } else if detector.target_label_list.len() != detector.target_path_list.len() {
                errors.push(format!(
                    "Analysis[{}] ('{}'): target_label_list has {} entries but target_path_list has {}; every path needs a label",
                    i,
                    detector.id,
                    detector.target_label_list.len(),
                    detector.target_path_list.len()
                ));
            }
        }
    }

    for (i, handler) in config.event_handlers.iter().enumerate() {
        use crate::config::types::EventHandlerType;
        let needs_path = matches!(handler.handler_type, EventHandlerType::Syslog | EventHandlerType::Json);
        if needs_path && handler.path.is_none() {
            errors.push(format!("EventHandlers[{}] ('{}'): 'path' is required for handler type '{:?}'", i, handler.id, handler.handler_type));
        }
    }

    for (i, writer) in config.stream_writers.iter().enumerate() {
        if writer.target_path_list.is_empty() {
            errors.push(format!("StreamWriters[{}] ('{}'): target_path_list must not be empty", i, writer.id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", yaml).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL_YAML: &str = r#"
Parser:
  - id: root
    start: true
    type: fixed
    args: "hello"
Input:
  Sources:
    - id: src-a
      path: /tmp/does-not-need-to-exist.log
"#;

    #[test]
    fn loads_a_minimal_valid_config() {
        let file = write_config(MINIMAL_YAML);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.parser.len(), 1);
        assert_eq!(config.input.sources.len(), 1);
    }

    #[test]
    fn missing_start_is_reported() {
        let yaml = r#"
Parser:
  - id: root
    type: fixed
    args: "hello"
Input:
  Sources:
    - id: src-a
      path: /tmp/does-not-need-to-exist.log
"#;
        let file = write_config(yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errs) => assert!(errs.iter().any(|e| e.contains("no element is marked start"))),
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_start_is_reported() {
        let yaml = r#"
Parser:
  - id: a
    start: true
    type: fixed
    args: "hello"
  - id: b
    start: true
    type: fixed
    args: "world"
Input:
  Sources:
    - id: src-a
      path: /tmp/does-not-need-to-exist.log
"#;
        let file = write_config(yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errs) => assert!(errs.iter().any(|e| e.contains("expected exactly one"))),
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }

    #[test]
    fn unresolved_parser_reference_is_reported() {
        let yaml = r#"
Parser:
  - id: root
    start: true
    type: sequence
    args:
      - missing_child
Input:
  Sources:
    - id: src-a
      path: /tmp/does-not-need-to-exist.log
"#;
        let file = write_config(yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errs) => assert!(errs.iter().any(|e| e.contains("undeclared parser id"))),
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }

    #[test]
    fn target_labels_without_target_paths_is_reported() {
        let yaml = r#"
Parser:
  - id: root
    start: true
    type: fixed
    args: "hello"
Input:
  Sources:
    - id: src-a
      path: /tmp/does-not-need-to-exist.log
Analysis:
  - id: counter
    type: parser_count
    target_label_list: [requests]
"#;
        let file = write_config(yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errs) => assert!(errs.iter().any(|e| e.contains("target_label_list is configured without target_path_list"))),
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_target_label_list_length_is_reported() {
        let yaml = r#"
Parser:
  - id: root
    start: true
    type: fixed
    args: "hello"
Input:
  Sources:
    - id: src-a
      path: /tmp/does-not-need-to-exist.log
Analysis:
  - id: counter
    type: parser_count
    target_path_list: [root/a, root/b]
    target_label_list: [only-one]
"#;
        let file = write_config(yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errs) => assert!(errs.iter().any(|e| e.contains("every path needs a label"))),
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }

    #[test]
    fn missing_sources_is_reported() {
        let yaml = r#"
Parser:
  - id: root
    start: true
    type: fixed
    args: "hello"
Input:
  Sources: []
"#;
        let file = write_config(yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errs) => assert!(errs.iter().any(|e| e.contains("at least one source"))),
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }
}
