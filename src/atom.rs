//! The Log Atom: one framed input record plus its parse result.
//! Immutable after construction; detectors read it but never mutate it
//! (`MonotonicTimestampAdjust` returns a new atom with the adjusted
//! timestamp instead of mutating in place).

use std::sync::Arc;

use crate::parser::MatchTree;

/// A byte-string, integer or opaque handle identifying which source an
/// atom came from. Cheap to clone since dispatch passes atoms by value.
pub type SourceId = Arc<str>;

#[derive(Debug, Clone)]
pub struct LogAtom {
    pub raw_data: Arc<[u8]>,
    pub match_tree: Option<Arc<MatchTree>>,
    pub timestamp: Option<f64>,
    pub source_id: SourceId,
    /// The configured `Input.TimestampPath`, kept on the atom so a
    /// transformer downstream (e.g. `MonotonicTimestampAdjust`) can tell
    /// which path produced `timestamp` without re-reading global config.
    pub default_timestamp_path: Option<Arc<str>>,
}

impl LogAtom {
    pub fn new(raw_data: Vec<u8>, match_tree: Option<MatchTree>, source_id: impl Into<SourceId>, default_timestamp_path: Option<Arc<str>>) -> Self {
        let timestamp = match_tree.as_ref().and_then(|tree| {
            let path = default_timestamp_path.as_deref()?;
            tree.get(path)?.first().value.as_numeric()
        });
        LogAtom {
            raw_data: raw_data.into(),
            match_tree: match_tree.map(Arc::new),
            timestamp,
            source_id: source_id.into(),
            default_timestamp_path,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.match_tree.is_some()
    }

    /// A new atom identical to this one except for its timestamp. Used by
    /// `MonotonicTimestampAdjust`, which rewrites the dispatch-visible
    /// timestamp without touching the parsed Match Tree.
    pub fn with_timestamp(&self, timestamp: Option<f64>) -> LogAtom {
        LogAtom { timestamp, ..self.clone() }
    }

    pub fn raw_text_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement};

    #[test]
    fn resolves_timestamp_from_default_path() {
        let element = MatchElement::new("root/time".to_string(), "time".to_string(), b"100".to_vec(), DecodedValue::Timestamp(100.0));
        let tree = MatchTree::from_root(&element);
        let atom = LogAtom::new(b"irrelevant".to_vec(), Some(tree), "src-a", Some("root/time".into()));
        assert_eq!(atom.timestamp, Some(100.0));
    }

    #[test]
    fn unparsed_atom_has_no_match_tree() {
        let atom = LogAtom::new(b"garbage".to_vec(), None, "src-a", None);
        assert!(!atom.is_parsed());
        assert!(atom.timestamp.is_none());
    }

    #[test]
    fn with_timestamp_preserves_match_tree() {
        let atom = LogAtom::new(b"x".to_vec(), None, "src-a", None);
        let adjusted = atom.with_timestamp(Some(42.0));
        assert_eq!(adjusted.timestamp, Some(42.0));
        assert_eq!(adjusted.raw_data, atom.raw_data);
    }
}
