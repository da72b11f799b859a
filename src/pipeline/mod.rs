//! Wires everything spec'd in the other modules into one runnable
//! engine: Parser Model, Atomizer(s)/Sequencer, Dispatch Fabric,
//! Detectors, Event Bus, Persister and Time Trigger scheduling, built
//! from a loaded `Config`. This is the one module allowed to know about
//! every other module at once; everything it calls stays ignorant of
//! the engine that assembles it.

use std::cell::Cell;
use std::fs::OpenOptions;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::atom::LogAtom;
use crate::atomizer::{Atomizer, AtomizerError};
use crate::config::types::Config;
use crate::detector::registry::{build_detector, DetectorBuildError};
use crate::detector::stream_writer::MatchValueStreamWriter;
use crate::detector::{resolve_learn_mode, Detector, DetectorRef, TriggerClass};
use crate::dispatch::{AtomHandler, DetectorHandle, SubhandlerFilter};
use crate::event::registry::{build_event_handler, EventHandlerBuildError};
use crate::event::EventBus;
use crate::parser::registry::{build_parser_tree, ParserBuildError};
use crate::parser::ParserNode;
use crate::persistence::{FilePersistenceStore, PersistenceError, PersistenceStore, Persister};
use crate::sequencer::{AtomSource, Sequencer};
use crate::source::FileSource;

#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error(transparent)]
    Parser(#[from] ParserBuildError),
    #[error(transparent)]
    Detector(#[from] DetectorBuildError),
    #[error(transparent)]
    EventHandler(#[from] EventHandlerBuildError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Input: at least one source is required")]
    NoSources,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Atomizer(#[from] AtomizerError),
}

/// A detector paired with the next time its `do_timer` is due. Realtime
/// detectors are driven by wall-clock `Instant`s; Analysis detectors by
/// the timestamp carried on dispatched atoms. Tracked with `Cell` rather
/// than requiring `&mut Engine` so `run` never needs to juggle mutable
/// and immutable borrows of `self` across a `select!`.
struct TimedRealtime {
    detector: DetectorRef,
    next_due: Cell<Instant>,
}

struct TimedAnalysis {
    detector: DetectorRef,
    next_due: Cell<f64>,
}

/// The assembled pipeline: Dispatch Fabric, Event Bus, Time Trigger
/// bookkeeping and the Persister, ready to run against an `AtomSource`.
/// Deliberately holds no atom source itself — `run` takes one by value —
/// so a caller (tests included) can dispatch atoms one at a time without
/// entering the async scheduling loop at all.
pub struct Engine {
    fabric: Box<dyn AtomHandler>,
    bus: EventBus,
    realtime: Vec<TimedRealtime>,
    analysis: Vec<TimedAnalysis>,
    persister: Persister,
}

fn wall_clock_epoch_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

impl Engine {
    /// Builds the engine and the atom source(s) it should be run against
    /// from a validated `Config`. Detector construction order follows
    /// `config.analysis` declaration order, matching spec.md §8 scenario
    /// 1's "14 registered detectors invoked in registration order".
    pub fn build(config: &Config) -> Result<(Engine, Box<dyn AtomSource>), EngineBuildError> {
        let parser_root = Rc::new(build_parser_tree(&config.parser)?);

        let store: Rc<dyn PersistenceStore> = Rc::new(FilePersistenceStore::new(config.persistence.base_dir.clone()));
        let mut persister = Persister::new(store.clone(), config.persistence.period_seconds);

        let mut detectors: Vec<DetectorRef> = Vec::with_capacity(config.analysis.len());
        for detector_config in &config.analysis {
            let learn_mode = resolve_learn_mode(detector_config.auto_include_flag, config.learn_mode);
            let detector = build_detector(detector_config, learn_mode)?;
            if let Some(key) = detector.borrow().persistence_key() {
                if let Some(doc) = store.load_json(&key)? {
                    detector.borrow_mut().load_persistence_data(doc);
                }
            }
            persister.add_persistable_component(&detector);
            detectors.push(detector);
        }

        let mut handlers: Vec<Box<dyn AtomHandler>> = Vec::with_capacity(detectors.len() + config.stream_writers.len());
        for detector in &detectors {
            handlers.push(Box::new(DetectorHandle(detector.clone())));
        }
        for writer_config in &config.stream_writers {
            let file = OpenOptions::new().create(true).append(true).open(&writer_config.sink_path).map_err(|source| PersistenceError::Io {
                key: writer_config.id.clone(),
                source,
            })?;
            let writer = MatchValueStreamWriter::new(writer_config.target_path_list.clone(), writer_config.separator.clone(), file);
            handlers.push(Box::new(writer));
        }

        let fabric: Box<dyn AtomHandler> = Box::new(SubhandlerFilter::new(handlers, false));
        let fabric: Box<dyn AtomHandler> = if config.input.monotonic_timestamp_adjust {
            Box::new(crate::detector::monotonic_timestamp_adjust::MonotonicTimestampAdjust::new(fabric))
        } else {
            fabric
        };

        let mut event_handlers = Vec::with_capacity(config.event_handlers.len());
        for handler_config in &config.event_handlers {
            event_handlers.push(build_event_handler(handler_config)?);
        }
        let bus = EventBus::new(event_handlers);

        let now_instant = Instant::now();
        let mut realtime = Vec::new();
        let mut analysis = Vec::new();
        for detector in &detectors {
            match detector.borrow().time_trigger_class() {
                Some(TriggerClass::Realtime) => realtime.push(TimedRealtime { detector: detector.clone(), next_due: Cell::new(now_instant) }),
                Some(TriggerClass::Analysis) => analysis.push(TimedAnalysis { detector: detector.clone(), next_due: Cell::new(f64::NEG_INFINITY) }),
                None => {}
            }
        }

        let engine = Engine { fabric, bus, realtime, analysis, persister };
        let atom_source = build_atom_source(config, &parser_root)?;
        Ok((engine, atom_source))
    }

    /// Delivers one atom through the Dispatch Fabric, then fires any
    /// Analysis-class time triggers whose deadline the atom's timestamp
    /// has reached. Exposed directly (not only via `run`) so tests and a
    /// one-shot replay mode can drive the engine without the async
    /// scheduling loop.
    pub fn dispatch(&self, atom: &LogAtom) {
        self.fabric.receive_atom(atom, &self.bus);
        let Some(now) = atom.timestamp else { return };
        for timed in &self.analysis {
            if now >= timed.next_due.get() {
                let next_delay = timed.detector.borrow_mut().do_timer(now, &self.bus);
                timed.next_due.set(now + next_delay.unwrap_or(3600.0).max(0.0));
            }
        }
    }

    fn fire_due_realtime(&self) {
        let wake = Instant::now();
        let now = wall_clock_epoch_seconds();
        for timed in &self.realtime {
            if timed.next_due.get() <= wake {
                let next_delay = timed.detector.borrow_mut().do_timer(now, &self.bus);
                timed.next_due.set(Instant::now() + Duration::from_secs_f64(next_delay.unwrap_or(3600.0).max(0.0)));
            }
        }
    }

    async fn sleep_until_next_realtime(&self) {
        match self.realtime.iter().map(|t| t.next_due.get()).min() {
            Some(instant) => tokio::time::sleep_until(instant.into()).await,
            None => std::future::pending::<()>().await,
        }
    }

    pub fn persist_all(&self) {
        self.persister.persist_all();
    }

    /// Runs the cooperative dispatch loop (spec.md §5): atoms, Realtime
    /// time triggers and the Persister's interval are all serviced from
    /// one loop, and only I/O suspension points (atom fetch, the
    /// persistence interval tick, `ctrl_c`) may yield. Returns cleanly on
    /// end-of-stream (every source exhausted) or `ctrl_c`; either path
    /// runs one final persist before returning, matching the "drains
    /// pending atoms through dispatch, runs one final `do_persist` on
    /// every persistable detector" shutdown contract.
    pub async fn run(self, mut atom_source: Box<dyn AtomSource>) -> Result<(), EngineError> {
        let mut persist_interval = tokio::time::interval(Duration::from_secs(self.persister.period_seconds().max(1)));
        persist_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        persist_interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received, persisting and exiting");
                    break;
                }
                _ = persist_interval.tick() => {
                    self.persister.persist_all();
                }
                _ = self.sleep_until_next_realtime() => {
                    self.fire_due_realtime();
                }
                next = atom_source.next_atom() => {
                    match next? {
                        Some(atom) => self.dispatch(&atom),
                        None => {
                            tracing::info!("every source exhausted, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.persister.persist_all();
        Ok(())
    }
}

fn build_atom_source(config: &Config, parser_root: &Rc<ParserNode>) -> Result<Box<dyn AtomSource>, EngineBuildError> {
    if config.input.sources.is_empty() {
        return Err(EngineBuildError::NoSources);
    }

    let mut atomizers: Vec<Box<dyn AtomSource>> = Vec::with_capacity(config.input.sources.len());
    for source_config in &config.input.sources {
        let source = FileSource::new(source_config.id.clone(), source_config.path.clone());
        let atomizer = Atomizer::new(source, parser_root.clone(), config.input.timestamp_path.clone(), source_config.on_parse_error);
        atomizers.push(Box::new(atomizer));
    }

    if !config.input.multi_source && atomizers.len() == 1 {
        return Ok(atomizers.into_iter().next().expect("checked len == 1"));
    }

    let grace_period = Duration::from_secs(config.input.source_grace_period_seconds);
    Ok(Box::new(Sequencer::new(atomizers, grace_period)))
}
