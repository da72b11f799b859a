//! The shared contract every concrete detector implements, plus the
//! learning-mode state machine and the small helpers (`MatchRule`,
//! ignore/constraint-list filtering) every concrete detector built on
//! top of it reuses.

pub mod allowlist_violation;
pub mod average_change;
pub mod enhanced_new_value_combo;
pub mod histogram;
pub mod monotonic_timestamp_adjust;
pub mod new_match_path;
pub mod new_match_path_value;
pub mod new_match_path_value_combo;
pub mod parser_count;
pub mod registry;
pub mod stream_writer;
pub mod time_correlation;
pub mod timestamps_unsorted;
pub mod value_range;

use std::cell::RefCell;
use std::rc::Rc;

use crate::atom::LogAtom;
use crate::event::EventBus;

/// The shape every concrete detector is held in once built: the pipeline
/// owns this `Rc`, the `Persister` holds a `Weak` clone of it (spec.md
/// §9 "detectors receive non-owning back-references").
pub type DetectorRef = Rc<RefCell<dyn Detector>>;

/// Which scheduler a time-triggered detector's `do_timer` is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerClass {
    Realtime,
    Analysis,
}

/// The common detector contract. Optional capabilities (time-triggered,
/// persistable, allowlistable) default to "not supported" so a trait
/// object list can hold every detector uniformly, without needing
/// downcasting at the dispatch boundary.
pub trait Detector {
    fn name(&self) -> &str;

    /// Returns handled/not-handled, not anomaly/not-anomaly. Side effects:
    /// updates counters, may update learned state, may emit events via
    /// `bus`.
    fn receive_atom(&mut self, atom: &LogAtom, bus: &EventBus) -> bool;

    /// Emits `log_success`/`log_total` for the last interval and resets
    /// both counters.
    fn log_statistics(&mut self) -> (u64, u64);

    fn time_trigger_class(&self) -> Option<TriggerClass> {
        None
    }

    /// Only meaningful when `time_trigger_class` is `Some`. Returns the
    /// next desired delay in seconds.
    fn do_timer(&mut self, _now: f64, _bus: &EventBus) -> Option<f64> {
        None
    }

    fn persistence_key(&self) -> Option<String> {
        None
    }

    fn do_persist(&self) -> Option<serde_json::Value> {
        None
    }

    fn load_persistence_data(&mut self, _doc: serde_json::Value) {}

    fn allowlist_event(&mut self, _kind: &str, _data: &str) -> Option<Result<String, String>> {
        None
    }

    fn blocklist_event(&mut self, _kind: &str, _data: &str) -> Option<Result<String, String>> {
        None
    }
}

/// Learning-mode state machine shared by every learning detector:
/// `Learning` -> `Locked` is the only transition, fired by an absolute
/// deadline or a sliding no-anomaly window, and is terminal within a
/// process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnState {
    Learning,
    Locked,
}

#[derive(Debug, Clone)]
pub struct LearnMode {
    pub state: LearnState,
    pub stop_learning_time: Option<f64>,
    pub stop_learning_no_anomaly_time: Option<f64>,
    /// Sliding deadline derived from `stop_learning_no_anomaly_time`,
    /// pushed forward on every anomaly-free observation that would have
    /// extended the model.
    sliding_deadline: Option<f64>,
}

impl LearnMode {
    pub fn new(enabled: bool, stop_learning_time: Option<f64>, stop_learning_no_anomaly_time: Option<f64>) -> Self {
        LearnMode {
            state: if enabled { LearnState::Learning } else { LearnState::Locked },
            stop_learning_time,
            stop_learning_no_anomaly_time,
            sliding_deadline: None,
        }
    }

    pub fn is_learning(&self) -> bool {
        self.state == LearnState::Learning
    }

    /// Call once per observation, before extending the model. `now` is
    /// the atom's timestamp (falls back to not checking the absolute
    /// deadline when unavailable).
    pub fn observe(&mut self, now: Option<f64>) {
        if self.state != LearnState::Learning {
            return;
        }
        if let (Some(deadline), Some(now)) = (self.stop_learning_time, now) {
            if now >= deadline {
                self.state = LearnState::Locked;
                return;
            }
        }
        if let Some(sliding) = self.stop_learning_no_anomaly_time {
            if let Some(now) = now {
                match self.sliding_deadline {
                    Some(deadline) if now >= deadline => {
                        self.state = LearnState::Locked;
                        return;
                    }
                    _ => self.sliding_deadline = Some(now + sliding),
                }
            }
        }
    }
}

/// Applies the pipeline-wide tri-state learn-mode override at build
/// time: `Some(true)` forces learning on, `Some(false)` forces it off,
/// `None` keeps each detector's declared `auto_include_flag`.
pub fn resolve_learn_mode(declared: bool, override_flag: Option<bool>) -> bool {
    override_flag.unwrap_or(declared)
}

/// One rule of an allowlist: matches when `path` is present in the atom's
/// Match Tree and, if `value` is set, the decoded value at that path
/// equals it.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub path: String,
    pub value: Option<String>,
}

impl MatchRule {
    pub fn matches(&self, atom: &LogAtom) -> bool {
        let Some(tree) = atom.match_tree.as_ref() else {
            return false;
        };
        let Some(matched) = tree.get(&self.path) else {
            return false;
        };
        match &self.value {
            Some(expected) => matched.first().value.display_string() == *expected,
            None => true,
        }
    }
}

/// True when the atom should be skipped under the ignore/constraint
/// filtering rule shared by `value-range` and similar detectors: any
/// overlap with `ignore_list` skips it, and every `constraint_list` path
/// must be present.
pub fn skip_atom(atom: &LogAtom, ignore_list: &[String], constraint_list: &[String]) -> bool {
    let Some(tree) = atom.match_tree.as_ref() else {
        return !constraint_list.is_empty();
    };
    if ignore_list.iter().any(|path| tree.contains(path)) {
        return true;
    }
    constraint_list.iter().any(|path| !tree.contains(path))
}
