//! The Atomizer: turns a `LineSource`'s raw bytes into `LogAtom`s by
//! running the Parser Model root over each framed line. A parse failure
//! is local and recoverable (spec.md §4.1 "Failure semantics") — the
//! atom is still produced, just with `match_tree: None`, unless the
//! source's `on_parse_error` strategy is `Panic`.

use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::atom::LogAtom;
use crate::config::types::ParseErrorStrategy;
use crate::parser::{MatchTree, ParserNode};
use crate::source::{LineSource, SourceError};

#[derive(Debug, Error)]
pub enum AtomizerError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("line from source '{source_id}' failed to parse and on_parse_error is Panic: {line}")]
    ParseFailure { source_id: String, line: String },
}

/// Wraps one `LineSource` and the shared Parser Model root. Not
/// `Send`/`Sync`: the parser tree holds `Cell`-based per-instance state
/// (`DateTimeNode::last_accepted`), and dispatch is single-threaded
/// cooperative per spec.md §5 anyway.
pub struct Atomizer<S> {
    source: S,
    parser_root: Rc<ParserNode>,
    default_timestamp_path: Option<Arc<str>>,
    on_parse_error: ParseErrorStrategy,
}

impl<S: LineSource> Atomizer<S> {
    pub fn new(source: S, parser_root: Rc<ParserNode>, default_timestamp_path: Option<String>, on_parse_error: ParseErrorStrategy) -> Self {
        Atomizer {
            source,
            parser_root,
            default_timestamp_path: default_timestamp_path.map(Arc::from),
            on_parse_error,
        }
    }

    pub fn source_id(&self) -> &str {
        self.source.source_id()
    }

    /// Produces the next `LogAtom`, or `None` at end-of-stream. A parse
    /// miss (or a parse that does not consume the whole line) yields an
    /// atom with `match_tree: None`, except under `ParseErrorStrategy::Panic`,
    /// which surfaces as an error instead.
    pub async fn next_atom(&mut self) -> Result<Option<LogAtom>, AtomizerError> {
        let Some(line) = self.source.next_line().await? else {
            return Ok(None);
        };
        let match_tree = match self.parser_root.parse(&line, 0, "") {
            Some(success) if success.consumed == line.len() => Some(MatchTree::from_root(&success.element)),
            _ => {
                if self.on_parse_error == ParseErrorStrategy::Panic {
                    return Err(AtomizerError::ParseFailure {
                        source_id: self.source.source_id().to_string(),
                        line: String::from_utf8_lossy(&line).into_owned(),
                    });
                }
                None
            }
        };
        Ok(Some(LogAtom::new(line, match_tree, self.source.source_id().to_string(), self.default_timestamp_path.clone())))
    }
}
