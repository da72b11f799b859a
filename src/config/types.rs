//! Top-level configuration schema: `Parser`, `Input`, `Analysis`,
//! `EventHandlers`, `LearnMode`. Trimmed to what a YAML author actually
//! needs to write: list-of-dicts fields such as `branch_model_dict`/
//! `date_formats` collapse to plain maps/`Vec<String>` rather than a
//! richer nested shape that would add no observable behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Parser")]
    pub parser: Vec<ParserElementConfig>,
    #[serde(rename = "Input")]
    pub input: InputConfig,
    #[serde(rename = "Analysis", default)]
    pub analysis: Vec<DetectorConfig>,
    #[serde(rename = "EventHandlers", default)]
    pub event_handlers: Vec<EventHandlerConfig>,
    #[serde(rename = "LearnMode", default)]
    pub learn_mode: Option<bool>,
    #[serde(rename = "Persistence", default)]
    pub persistence: PersistenceConfig,
    /// Sidecar `MatchValueStreamWriter` consumers, not anomaly detectors;
    /// they sit in the dispatch chain alongside `Analysis` but copy
    /// values to a sink rather than learning a baseline.
    #[serde(rename = "StreamWriters", default)]
    pub stream_writers: Vec<StreamWriterConfig>,
}

/// Where and how often detector state is flushed (spec.md §4.6's
/// `KEY_PERSISTENCE_PERIOD`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_persistence_period_seconds")]
    pub period_seconds: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig { base_dir: default_persistence_dir(), period_seconds: default_persistence_period_seconds() }
    }
}

fn default_persistence_dir() -> PathBuf {
    PathBuf::from("/var/lib/aminer-rs")
}

fn default_persistence_period_seconds() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamWriterConfig {
    pub id: String,
    pub target_path_list: Vec<String>,
    #[serde(default = "default_stream_writer_separator")]
    pub separator: String,
    pub sink_path: PathBuf,
}

fn default_stream_writer_separator() -> String {
    ",".to_string()
}

/// One entry of the `Parser` list. `min_repeat`/`max_repeat`,
/// `key_value_delimiter`, `optional_keys` and `default_branch` are
/// supplements needed to make `Repeated`/`Delimited`/`ElementValueBranch`
/// constructible from YAML (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserElementConfig {
    pub id: String,
    #[serde(default)]
    pub start: bool,
    #[serde(rename = "type")]
    pub parser_type: String,
    pub name: Option<String>,
    #[serde(default)]
    pub args: ArgsValue,
    /// Decoded branch value (as its display string) -> child parser id.
    #[serde(default)]
    pub branch_model_dict: HashMap<String, String>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub value_sign_type: SignTypeConfig,
    #[serde(default)]
    pub value_pad_type: PadTypeConfig,
    #[serde(default)]
    pub exponent_type: SignTypeConfig,
    pub start_year: Option<i32>,
    pub delimiter: Option<String>,
    pub key_value_delimiter: Option<String>,
    pub escape: Option<String>,
    #[serde(default)]
    pub consume_delimiter: bool,
    /// Field key (post-prefix-stripping) -> sub-parser id.
    #[serde(default)]
    pub key_parser_dict: HashMap<String, String>,
    #[serde(default)]
    pub optional_keys: Vec<String>,
    #[serde(default = "default_optional_key_prefix")]
    pub optional_key_prefix: String,
    #[serde(default = "default_nullable_key_prefix")]
    pub nullable_key_prefix: String,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_true")]
    pub ignore_null: bool,
    pub date_format: Option<String>,
    pub text_locale: Option<String>,
    #[serde(default = "default_max_time_jump")]
    pub max_time_jump_seconds: i64,
    #[serde(default = "default_timestamp_scale")]
    pub timestamp_scale: i64,
    #[serde(default)]
    pub allow_all_fields: bool,
    #[serde(default)]
    pub min_repeat: usize,
    pub max_repeat: Option<usize>,
}

fn default_optional_key_prefix() -> String {
    "optional_key_".to_string()
}

fn default_nullable_key_prefix() -> String {
    "+".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_time_jump() -> i64 {
    86400
}

fn default_timestamp_scale() -> i64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignTypeConfig {
    #[default]
    None,
    Optional,
    Mandatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PadTypeConfig {
    #[default]
    None,
    Zero,
    Blank,
}

/// A scalar, or a list of strings/ints.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ArgsValue {
    #[default]
    None,
    Single(String),
    List(Vec<ArgItem>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgItem {
    Str(String),
    Int(i64),
}

impl ArgItem {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgItem::Str(s) => Some(s),
            ArgItem::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgItem::Int(i) => Some(*i),
            ArgItem::Str(s) => s.parse().ok(),
        }
    }
}

impl ArgsValue {
    pub fn as_list(&self) -> Vec<ArgItem> {
        match self {
            ArgsValue::None => Vec::new(),
            ArgsValue::Single(s) => vec![ArgItem::Str(s.clone())],
            ArgsValue::List(items) => items.clone(),
        }
    }

    pub fn as_single_str(&self) -> Option<&str> {
        match self {
            ArgsValue::Single(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(rename = "Sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(rename = "MultiSource", default)]
    pub multi_source: bool,
    /// Path whose decoded value, if present, seeds `LogAtom.timestamp`.
    #[serde(rename = "TimestampPath")]
    pub timestamp_path: Option<String>,
    /// Source silence beyond this many seconds no longer blocks the
    /// multi-source synchroniser.
    #[serde(rename = "SourceGracePeriodSeconds", default = "default_source_grace_period")]
    pub source_grace_period_seconds: u64,
    /// Wraps the dispatch fabric in `MonotonicTimestampAdjust` so every
    /// detector downstream sees a non-decreasing timestamp regardless of
    /// what the sources or the multi-source merge produced.
    #[serde(rename = "MonotonicTimestampAdjust", default)]
    pub monotonic_timestamp_adjust: bool,
}

fn default_source_grace_period() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(rename = "type", default)]
    pub source_type: SourceType,
    pub path: PathBuf,
    #[serde(default)]
    pub on_parse_error: ParseErrorStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorStrategy {
    #[default]
    Drop,
    Panic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub detector_type: String,
    #[serde(default)]
    pub persistence_id: Option<String>,
    #[serde(default)]
    pub auto_include_flag: bool,
    #[serde(default)]
    pub id_path_list: Vec<String>,
    #[serde(default)]
    pub target_path_list: Vec<String>,
    #[serde(default)]
    pub target_label_list: Vec<String>,
    #[serde(default)]
    pub ignore_list: Vec<String>,
    #[serde(default)]
    pub constraint_list: Vec<String>,
    #[serde(default)]
    pub report_interval_seconds: Option<u64>,
    #[serde(default)]
    pub split_reports_flag: bool,
    #[serde(default)]
    pub stop_learning_time: Option<f64>,
    #[serde(default)]
    pub stop_learning_no_anomaly_time: Option<f64>,
    #[serde(default)]
    pub exit_on_error_flag: bool,
    #[serde(default)]
    pub output_logline: bool,
    #[serde(default)]
    pub allowlist_rules: Vec<MatchRuleConfig>,
    #[serde(default)]
    pub sigma_threshold: Option<f64>,
    #[serde(default)]
    pub expected_latency_seconds: Option<f64>,
    #[serde(default)]
    pub correlation_path_a: Option<String>,
    #[serde(default)]
    pub correlation_path_b: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRuleConfig {
    pub path: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHandlerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub handler_type: EventHandlerType,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventHandlerType {
    Stdout,
    Syslog,
    Json,
    Mail,
}
