//! The Input side of the external interface: a byte source the Atomizer
//! reads newline-delimited lines from. `FileSource` ships as the one
//! reference implementation, a straightforward buffered-line reader;
//! "is this a new record" is answered by the Parser Model in the
//! Atomizer, not by the source, so there is no line-continuation logic
//! here.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error reading source '{path}': {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

/// A byte source the Atomizer reads one line at a time. `None` signals
/// end-of-stream; a source that follows (tails) a growing file would
/// simply never return `None`.
#[async_trait(?Send)]
pub trait LineSource {
    /// The opaque source identifier attached to every `LogAtom` this
    /// source produces.
    fn source_id(&self) -> &str;

    /// Reads the next newline-delimited line, without its trailing
    /// terminator. `Ok(None)` is end-of-stream.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
}

/// Reads a file from start to finish, newline-delimited, once. Does not
/// follow a growing file or handle rotation; a deployment that needs
/// `tail -f` semantics wraps this behind a different `LineSource`.
pub struct FileSource {
    source_id: String,
    path: PathBuf,
    reader: Option<BufReader<tokio::fs::File>>,
}

impl FileSource {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        FileSource { source_id: source_id.into(), path: path.into(), reader: None }
    }

    async fn ensure_open(&mut self) -> Result<&mut BufReader<tokio::fs::File>, SourceError> {
        if self.reader.is_none() {
            let file = tokio::fs::File::open(&self.path)
                .await
                .map_err(|source| SourceError::Io { path: self.path.clone(), source })?;
            self.reader = Some(BufReader::new(file));
        }
        Ok(self.reader.as_mut().expect("just set"))
    }
}

#[async_trait(?Send)]
impl LineSource for FileSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let path = self.path.clone();
        let reader = self.ensure_open().await?;
        let mut buf = Vec::new();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|source| SourceError::Io { path, source })?;
        if read == 0 {
            return Ok(None);
        }
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

/// An in-memory source, used by tests and by the multi-source synchroniser
/// tests to avoid touching the filesystem.
pub struct MemorySource {
    source_id: String,
    lines: std::collections::VecDeque<Vec<u8>>,
}

impl MemorySource {
    pub fn new(source_id: impl Into<String>, lines: impl IntoIterator<Item = Vec<u8>>) -> Self {
        MemorySource { source_id: source_id.into(), lines: lines.into_iter().collect() }
    }
}

#[async_trait(?Send)]
impl LineSource for MemorySource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.lines.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_source_yields_lines_then_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, b"first\nsecond\n").unwrap();
        let mut source = FileSource::new("src-a", path);
        assert_eq!(source.next_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_source_yields_trailing_line_without_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, b"first\nno-newline").unwrap();
        let mut source = FileSource::new("src-a", path);
        assert_eq!(source.next_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"no-newline".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_source_yields_given_lines() {
        let mut source = MemorySource::new("src-a", vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(source.next_line().await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), None);
    }
}
