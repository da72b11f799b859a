//! The multi-source synchroniser: merges several Atomizers into one
//! non-decreasing-by-timestamp stream. One buffered atom per source,
//! the smallest timestamp released first, ties broken by registration
//! order. A single-source pipeline skips this entirely and reads its
//! one Atomizer directly.

use std::time::Duration;

use async_trait::async_trait;

use crate::atom::LogAtom;
use crate::atomizer::{Atomizer, AtomizerError};
use crate::source::LineSource;

/// Object-safe view of an `Atomizer<S>`, letting the sequencer hold
/// sources of different concrete types (e.g. several `FileSource`s) in
/// one list.
#[async_trait(?Send)]
pub trait AtomSource {
    fn source_id(&self) -> &str;
    async fn next_atom(&mut self) -> Result<Option<LogAtom>, AtomizerError>;
}

#[async_trait(?Send)]
impl<S: LineSource> AtomSource for Atomizer<S> {
    fn source_id(&self) -> &str {
        Atomizer::source_id(self)
    }

    async fn next_atom(&mut self) -> Result<Option<LogAtom>, AtomizerError> {
        Atomizer::next_atom(self).await
    }
}

struct Slot {
    source: Box<dyn AtomSource>,
    buffered: Option<LogAtom>,
    done: bool,
}

/// Merges `N` atomizers into one stream, non-decreasing by timestamp.
/// Atoms without a resolved timestamp are released as soon as buffered,
/// ahead of any timestamped atom, since there is no ordering signal to
/// hold them on.
pub struct Sequencer {
    slots: Vec<Slot>,
    grace_period: Duration,
}

impl Sequencer {
    pub fn new(sources: Vec<Box<dyn AtomSource>>, grace_period: Duration) -> Self {
        let slots = sources.into_iter().map(|source| Slot { source, buffered: None, done: false }).collect();
        Sequencer { slots, grace_period }
    }

    /// Fills every empty, not-yet-done slot's buffer, allowing up to
    /// `grace_period` for a source that has gone quiet before treating it
    /// as temporarily absent for this round.
    async fn fill_slots(&mut self) -> Result<(), AtomizerError> {
        for slot in &mut self.slots {
            if slot.done || slot.buffered.is_some() {
                continue;
            }
            let fetch = slot.source.next_atom();
            match tokio::time::timeout(self.grace_period, fetch).await {
                Ok(Ok(Some(atom))) => slot.buffered = Some(atom),
                Ok(Ok(None)) => slot.done = true,
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {}
            }
        }
        Ok(())
    }

    /// Returns the next atom in merge order, or `None` once every source
    /// is exhausted.
    pub async fn next_atom(&mut self) -> Result<Option<LogAtom>, AtomizerError> {
        loop {
            self.fill_slots().await?;

            if self.slots.iter().all(|s| s.done) {
                return Ok(None);
            }

            let ready = self.slots.iter().any(|s| s.buffered.is_some());
            if !ready {
                continue;
            }

            let mut best_index = None;
            let mut best_key = f64::INFINITY;
            for (i, slot) in self.slots.iter().enumerate() {
                let Some(atom) = slot.buffered.as_ref() else { continue };
                let key = atom.timestamp.unwrap_or(f64::NEG_INFINITY);
                if key < best_key {
                    best_key = key;
                    best_index = Some(i);
                }
            }
            let Some(index) = best_index else { continue };
            return Ok(self.slots[index].buffered.take());
        }
    }
}

/// Lets the engine hold either a single `Atomizer` or a multi-source
/// `Sequencer` behind one `Box<dyn AtomSource>` without caring which.
#[async_trait(?Send)]
impl AtomSource for Sequencer {
    fn source_id(&self) -> &str {
        "sequencer"
    }

    async fn next_atom(&mut self) -> Result<Option<LogAtom>, AtomizerError> {
        Sequencer::next_atom(self).await
    }
}
