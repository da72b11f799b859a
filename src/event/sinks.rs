//! Reference sink implementations. Stdout and the JSON-lines sink cover
//! the common case; the file-backed sink doubles as a "syslog-style"
//! sink (one line per event, left to be rotated externally, matching how
//! a real syslog target is normally fed). Mail is an interface-only stub
//! recording messages in memory, left for a real SMTP-backed sink to
//! plug in later.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use super::{AnomalyEvent, EventHandler};

/// Writes one formatted line per event to stdout.
pub struct StdoutSink;

impl EventHandler for StdoutSink {
    fn receive_event(&self, event: &AnomalyEvent) {
        println!("{}: {}", event.source, event.message);
        for line in &event.sorted_log_lines {
            println!("  {}", line);
        }
    }
}

/// One line per event, appended to a file. Rotation is left to the
/// operator, as with a real syslog target.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        FileSink { path }
    }
}

impl EventHandler for FileSink {
    fn receive_event(&self, event: &AnomalyEvent) {
        let line = format!("{}: {}", event.source, event.message);
        if let Err(err) = append_line(&self.path, &line) {
            tracing::error!(path = %self.path.display(), error = %err, "file sink failed to write event");
        }
    }
}

/// One JSON document per event, newline-delimited.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: PathBuf) -> Self {
        JsonLinesSink { path }
    }
}

impl EventHandler for JsonLinesSink {
    fn receive_event(&self, event: &AnomalyEvent) {
        let envelope = serde_json::json!({
            "source": event.source,
            "message": event.message,
            "data": event.event_data,
        });
        match serde_json::to_string(&envelope) {
            Ok(line) => {
                if let Err(err) = append_line(&self.path, &line) {
                    tracing::error!(path = %self.path.display(), error = %err, "json sink failed to write event");
                }
            }
            Err(err) => tracing::error!(error = %err, "json sink failed to serialize event"),
        }
    }
}

fn append_line(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

/// Interface-only stub: documents where a real SMTP-backed sink would
/// plug in. Records events in memory so tests can assert it was reached.
pub struct MailSink {
    sent: RefCell<Vec<String>>,
}

impl MailSink {
    pub fn new() -> Self {
        MailSink { sent: RefCell::new(Vec::new()) }
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }
}

impl Default for MailSink {
    fn default() -> Self {
        MailSink::new()
    }
}

impl EventHandler for MailSink {
    fn receive_event(&self, event: &AnomalyEvent) {
        self.sent.borrow_mut().push(event.message.clone());
    }
}
